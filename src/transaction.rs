use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, PartialEq, Eq, Ord, PartialOrd, parse_display::Display)]
#[display("{0}")]
pub struct AccountId(pub Uuid);

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, PartialEq, Eq, parse_display::Display)]
#[display("{0}")]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Links the two sides of a tip (and a possible reversal) for reconciliation.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, PartialEq, Eq, parse_display::Display)]
#[display("{0}")]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, PartialEq, Eq, parse_display::Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum TransactionKind {
    Earn,
    Spend,
    Tip,
    /// Credit that undoes a tip debit whose paired credit never landed.
    Reversal,
}

impl TransactionKind {
    pub const fn direction(self) -> Direction {
        match self {
            Self::Earn | Self::Reversal => Direction::Credit,
            Self::Spend | Self::Tip => Direction::Debit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, PartialEq, Eq, parse_display::Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

/// A strictly positive amount, so zero and negative values are rejected once at the edge.
#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, parse_display::Display)]
#[display("{0}")]
#[serde(transparent)]
pub struct PositiveAmount(Decimal);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("amount must be greater than zero value={value}")]
pub struct NonPositiveAmount {
    pub value: Decimal,
}

impl TryFrom<Decimal> for PositiveAmount {
    type Error = NonPositiveAmount;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value <= Decimal::ZERO {
            return Err(NonPositiveAmount { value });
        }
        Ok(Self(value))
    }
}

impl PositiveAmount {
    pub const fn as_inner(&self) -> Decimal {
        self.0
    }
}

impl<'de> Deserialize<'de> for PositiveAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let decimal = <Decimal as serde::Deserialize>::deserialize(deserializer)?;
        Self::try_from(decimal).map_err(|error| serde::de::Error::custom(error.to_string()))
    }
}

/// Signed balance change: a direction plus a positive magnitude.
#[derive(Debug, Copy, Clone, PartialEq, Eq, parse_display::Display)]
#[display("{direction} {amount}")]
pub struct Delta {
    pub direction: Direction,
    pub amount: PositiveAmount,
}

impl Delta {
    pub const fn credit(amount: PositiveAmount) -> Self {
        Self {
            direction: Direction::Credit,
            amount,
        }
    }

    pub const fn debit(amount: PositiveAmount) -> Self {
        Self {
            direction: Direction::Debit,
            amount,
        }
    }

    pub fn signed(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount.as_inner(),
            Direction::Debit => -self.amount.as_inner(),
        }
    }
}

/// Entry as built by the engine, before the store stamps it at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub counterparty: Option<AccountId>,
    pub correlation_id: Option<CorrelationId>,
}

impl NewEntry {
    pub fn system(kind: TransactionKind) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            kind,
            counterparty: None,
            correlation_id: None,
        }
    }

    pub fn correlated(kind: TransactionKind, counterparty: AccountId, correlation_id: CorrelationId) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            kind,
            counterparty: Some(counterparty),
            correlation_id: Some(correlation_id),
        }
    }
}

/// An immutable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: PositiveAmount,
    pub counterparty: Option<AccountId>,
    pub correlation_id: Option<CorrelationId>,
    pub timestamp: DateTime<Utc>,
}

/// Caller supplied token deduplicating retried transfers.
#[derive(Debug, Serialize, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, parse_display::Display)]
#[display("{0}")]
#[serde(transparent)]
pub struct IdempotencyKey(String);

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyKeyError {
    #[error("idempotency key is empty")]
    Empty,
    #[error("idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} characters len={len}")]
    TooLong { len: usize },
    #[error("idempotency key contains invalid character={character:?}")]
    InvalidCharacter { character: char },
}

impl TryFrom<&str> for IdempotencyKey {
    type Error = IdempotencyKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(IdempotencyKeyError::Empty);
        }
        if value.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(IdempotencyKeyError::TooLong { len: value.len() });
        }
        if let Some(character) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(IdempotencyKeyError::InvalidCharacter { character });
        }
        Ok(Self(value.to_owned()))
    }
}

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0")]
    #[case("-5.00")]
    fn positive_amount_rejects_zero_and_negative_values(#[case] raw: &str) {
        let value = Decimal::from_str(raw).unwrap();
        assert2::let_assert!(Err(error) = PositiveAmount::try_from(value));
        assert_eq!(error, NonPositiveAmount { value });
    }

    #[test]
    fn positive_amount_deserialize_returns_the_expected_error() {
        let res = serde_json::from_str::<PositiveAmount>("\"-1\"");
        assert2::let_assert!(Err(error) = res);
        assert!(error.to_string().contains("amount must be greater than zero"));
    }

    #[rstest]
    #[case(TransactionKind::Earn, Direction::Credit)]
    #[case(TransactionKind::Spend, Direction::Debit)]
    #[case(TransactionKind::Tip, Direction::Debit)]
    #[case(TransactionKind::Reversal, Direction::Credit)]
    fn transaction_kind_direction_is_fixed_by_kind(#[case] kind: TransactionKind, #[case] expected: Direction) {
        assert_eq!(kind.direction(), expected);
    }

    #[test]
    fn delta_signed_returns_negative_value_for_debits() {
        let amount = PositiveAmount::try_from(Decimal::from(30)).unwrap();
        assert_eq!(Delta::debit(amount).signed(), Decimal::from(-30));
        assert_eq!(Delta::credit(amount).signed(), Decimal::from(30));
    }

    #[rstest]
    #[case("", IdempotencyKeyError::Empty)]
    #[case("tip 1", IdempotencyKeyError::InvalidCharacter { character: ' ' })]
    #[case("tip/1", IdempotencyKeyError::InvalidCharacter { character: '/' })]
    fn idempotency_key_returns_the_expected_error(#[case] raw: &str, #[case] expected: IdempotencyKeyError) {
        assert2::let_assert!(Err(error) = IdempotencyKey::try_from(raw));
        assert_eq!(error, expected);
    }

    #[test]
    fn idempotency_key_rejects_keys_above_the_length_limit() {
        let raw = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert2::let_assert!(Err(IdempotencyKeyError::TooLong { len }) = IdempotencyKey::try_from(raw.as_str()));
        assert_eq!(len, MAX_IDEMPOTENCY_KEY_LEN + 1);
    }

    #[test]
    fn idempotency_key_accepts_uuid_like_keys() {
        let key = IdempotencyKey::try_from("tip:2024-01-01_abc.9").unwrap();
        assert_eq!(key.as_str(), "tip:2024-01-01_abc.9");
    }
}
