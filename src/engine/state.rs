use serde::Serialize;

/// Lifecycle of a single tip.
///
/// ```text
/// Initiated -> Debited -> Credited          (success)
///                      -> DebitReversed     (credit impossible, debit undone)
///                      -> Unresolved        (reversal failed, left for reconciliation)
/// Initiated -> Rejected                     (nothing was mutated)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, parse_display::Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum TransferState {
    Initiated,
    Debited,
    Credited,
    DebitReversed,
    Unresolved,
    Rejected,
}

impl TransferState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Credited | Self::DebitReversed | Self::Unresolved | Self::Rejected
        )
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initiated, Self::Debited | Self::Credited | Self::Rejected)
                | (Self::Debited, Self::Credited | Self::DebitReversed | Self::Unresolved)
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(TransferState::Initiated, TransferState::Debited)]
    #[case(TransferState::Initiated, TransferState::Credited)]
    #[case(TransferState::Initiated, TransferState::Rejected)]
    #[case(TransferState::Debited, TransferState::Credited)]
    #[case(TransferState::Debited, TransferState::DebitReversed)]
    #[case(TransferState::Debited, TransferState::Unresolved)]
    fn can_transition_to_allows_the_expected_edges(#[case] from: TransferState, #[case] to: TransferState) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case(TransferState::Debited, TransferState::Rejected)]
    #[case(TransferState::Credited, TransferState::DebitReversed)]
    #[case(TransferState::Rejected, TransferState::Debited)]
    #[case(TransferState::DebitReversed, TransferState::Credited)]
    fn can_transition_to_refuses_leaving_terminal_or_skipping_states(
        #[case] from: TransferState,
        #[case] to: TransferState,
    ) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn is_terminal_matches_states_without_outgoing_edges() {
        assert!(!TransferState::Initiated.is_terminal());
        assert!(!TransferState::Debited.is_terminal());
        assert!(TransferState::Credited.is_terminal());
        assert!(TransferState::Unresolved.is_terminal());
    }
}
