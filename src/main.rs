use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use prize_draw_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::CardPayments,
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    store::Stores,
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let stores = Stores::postgres(pool, config.checkout.order_number_start)
        .await
        .expect("Failed to initialise stores");

    let jwt_service = JwtService::new(&config.jwt.secret);

    // 卡支付: 未配置 Cashflows 凭据时禁用
    let card_payments =
        CardPayments::from_config(&config.cashflows).expect("Failed to create Cashflows client");

    // 创建服务
    let allocation_service = AllocationService::new(
        stores.tickets.clone(),
        stores.ledger.clone(),
        Arc::new(RandomDraw),
        config.checkout.allocation_attempt_factor,
    );
    let checkout_service = CheckoutService::new(
        stores.clone(),
        allocation_service,
        card_payments,
        config.checkout.clone(),
    );
    let order_service = OrderService::new(stores.orders.clone());
    let wallet_service = WalletService::new(stores.ledger.clone());

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors())
            .wrap(Logger::default())
            .app_data(web::Data::new(checkout_service.clone()))
            .app_data(web::Data::new(order_service.clone()))
            .app_data(web::Data::new(wallet_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::checkout_config)
                    .configure(handlers::order_config)
                    .configure(handlers::wallet_config)
                    .configure(handlers::webhook_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
