use crate::entities::{WalletType, competition_entity};
use crate::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;
use uuid::Uuid;

/// One instant win prize of a competition.
///
/// `winning_numbers` may overlap other prizes (the first prize in list order wins)
/// and may contain numbers above the competition's capacity, which simply never match.
/// Prize tables authored before the JSON array format stored the numbers as a
/// comma separated string; both forms are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PrizeDescriptor {
    #[serde(alias = "name")]
    pub label: String,
    #[serde(
        alias = "numbers",
        default,
        deserialize_with = "deserialize_winning_numbers"
    )]
    #[schema(value_type = Vec<i64>)]
    pub winning_numbers: BTreeSet<i64>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub wallet_type: WalletType,
}

impl PrizeDescriptor {
    pub fn new(
        label: impl Into<String>,
        winning_numbers: impl IntoIterator<Item = i64>,
        amount: i64,
        wallet_type: WalletType,
    ) -> Self {
        Self {
            label: label.into(),
            winning_numbers: winning_numbers.into_iter().collect(),
            amount,
            wallet_type,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWinningNumbers {
    List(Vec<i64>),
    Text(String),
}

fn deserialize_winning_numbers<'de, D>(deserializer: D) -> Result<BTreeSet<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawWinningNumbers::deserialize(deserializer)? {
        RawWinningNumbers::List(list) => list.into_iter().collect(),
        // 无法解析的旧格式奖品视为无中奖号码
        RawWinningNumbers::Text(text) => parse_winning_numbers(&text).unwrap_or_default(),
    })
}

/// Parses the legacy `"12, 45,300"` format. Any unparsable token rejects the whole list.
pub fn parse_winning_numbers(text: &str) -> Option<BTreeSet<i64>> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<i64>().ok())
        .collect()
}

/// Outcome of matching a ticket number against a prize table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct WinResult {
    pub label: String,
    pub amount: i64,
    pub wallet_type: WalletType,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Competition {
    pub id: Uuid,
    pub title: String,
    pub price: i64,
    pub max_tickets: i64,
    pub tickets_sold: i64,
    pub instant_wins: Vec<PrizeDescriptor>,
}

impl Competition {
    /// Tickets still on sale according to the sold counter. Advisory only:
    /// the ticket pool is the authority on which numbers are free.
    pub fn available(&self) -> i64 {
        (self.max_tickets - self.tickets_sold).max(0)
    }
}

impl TryFrom<competition_entity::Model> for Competition {
    type Error = AppError;

    fn try_from(m: competition_entity::Model) -> Result<Self, Self::Error> {
        let instant_wins: Vec<PrizeDescriptor> = serde_json::from_value(m.instant_wins)?;
        Ok(Self {
            id: m.id,
            title: m.title,
            price: m.price,
            max_tickets: m.max_tickets,
            tickets_sold: m.tickets_sold,
            instant_wins,
        })
    }
}
