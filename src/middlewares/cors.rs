use actix_cors::Cors;

/// The storefront calls checkout and order endpoints from the browser; the
/// gateway webhook is server to server and unaffected.
pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
