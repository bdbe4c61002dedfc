//! Ledger commands as read from a replay CSV (`type,user,counterparty,amount,key`).

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Deserializer;

#[derive(Debug, Clone, PartialEq, Eq, parse_display::Display)]
pub enum LedgerCommand {
    #[display("open user={user}")]
    Open { user: String },
    #[display("earn user={user} amount={amount}")]
    Earn { user: String, amount: Decimal },
    #[display("spend user={user} amount={amount}")]
    Spend { user: String, amount: Decimal },
    #[display("tip user={user} recipient={recipient} amount={amount}")]
    Tip {
        user: String,
        recipient: String,
        amount: Decimal,
        key: Option<String>,
    },
}

impl<'de> Deserialize<'de> for LedgerCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CsvRow {
            r#type: String,
            user: String,
            counterparty: Option<String>,
            amount: Option<Decimal>,
            key: Option<String>,
        }

        let row = CsvRow::deserialize(deserializer)?;
        let amount = || -> Result<Decimal, D::Error> {
            row.amount
                .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("amount"))
        };

        let command = match row.r#type.as_str() {
            "open" => Self::Open { user: row.user.clone() },
            "earn" => Self::Earn {
                user: row.user.clone(),
                amount: amount()?,
            },
            "spend" => Self::Spend {
                user: row.user.clone(),
                amount: amount()?,
            },
            "tip" => Self::Tip {
                user: row.user.clone(),
                recipient: row
                    .counterparty
                    .clone()
                    .filter(|recipient| !recipient.is_empty())
                    .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("counterparty"))?,
                amount: amount()?,
                key: row.key.clone().filter(|key| !key.is_empty()),
            },
            other => {
                return Err(<D::Error as serde::de::Error>::unknown_variant(
                    other,
                    &["open", "earn", "spend", "tip"],
                ));
            }
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use csv::Trim;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("open,alice,,,", LedgerCommand::Open { user: "alice".into() })]
    #[case("earn,alice,,12.5,", LedgerCommand::Earn { user: "alice".into(), amount: Decimal::from_str("12.5").unwrap() })]
    #[case("spend,bob,,3,", LedgerCommand::Spend { user: "bob".into(), amount: Decimal::from(3) })]
    #[case(
        "tip,alice,bob,30,retry-1",
        LedgerCommand::Tip {
            user: "alice".into(),
            recipient: "bob".into(),
            amount: Decimal::from(30),
            key: Some("retry-1".into()),
        }
    )]
    #[case(
        "tip,alice,bob,30,",
        LedgerCommand::Tip {
            user: "alice".into(),
            recipient: "bob".into(),
            amount: Decimal::from(30),
            key: None,
        }
    )]
    fn deserialize_command_returns_the_expected_commands(#[case] csv_row: &str, #[case] expected: LedgerCommand) {
        assert2::let_assert!(Ok(commands) = deserialize_csv_rows(csv_row));
        assert_eq!([expected], commands.as_slice());
    }

    #[rstest]
    #[case("earn,alice,,,", "missing field `amount`")]
    #[case("tip,alice,,5,", "missing field `counterparty`")]
    #[case(
        "withdraw,alice,,5,",
        "unknown variant `withdraw`, expected one of `open`, `earn`, `spend`, `tip`"
    )]
    fn deserialize_command_returns_the_expected_error(#[case] csv_row: &str, #[case] expected_substr: &str) {
        assert2::let_assert!(Err(error) = deserialize_csv_rows(csv_row));
        assert!(
            error.to_string().contains(expected_substr),
            "error={error:?} does not contain expected={expected_substr}'",
        );
    }

    fn deserialize_csv_rows(row: &str) -> Result<Vec<LedgerCommand>, csv::Error> {
        let data = format!("type,user,counterparty,amount,key\n{row}");
        let mut rdr = csv::ReaderBuilder::new().trim(Trim::All).from_reader(data.as_bytes());
        let mut out = Vec::new();
        for rec in rdr.deserialize::<LedgerCommand>() {
            out.push(rec?);
        }
        Ok(out)
    }
}
