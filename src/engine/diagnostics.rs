use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::core::{KeySet, format_keys};

/// One frontier round, a single traversal computing a batch of keys whose
/// prerequisites were already available.
#[derive(Debug, Clone)]
pub struct Round {
    pub keys: KeySet,
    /// Nodes visited by the traversal.
    pub visited: usize,
    /// Values actually produced, strategies that did not apply are not counted.
    pub stored: usize,
    pub duration: Duration,
}

/// Execution report returned by [`Engine::annotate`](crate::Engine::annotate).
///
/// Rounds are listed in the order they ran, so a key's prerequisites always
/// appear in an earlier round than the key itself.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub rounds: Vec<Round>,
}

impl Diagnostics {
    /// True when nothing had to be computed.
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// All keys computed by this call.
    pub fn computed(&self) -> KeySet {
        self.rounds
            .iter()
            .flat_map(|round| round.keys.iter().cloned())
            .collect()
    }

    /// Index of the round that computed `key`.
    pub fn round_of(&self, key: &str) -> Option<usize> {
        self.rounds.iter().position(|round| round.keys.contains(key))
    }

    pub fn stored(&self) -> usize {
        self.rounds.iter().map(|round| round.stored).sum()
    }

    pub fn duration(&self) -> Duration {
        self.rounds.iter().map(|round| round.duration).sum()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.rounds.is_empty() {
            return writeln!(f, "nothing to compute");
        }

        for (i, round) in self.rounds.iter().enumerate() {
            writeln!(
                f,
                "round {i}: {} over {} nodes, {} values in {:.2?}",
                format_keys(&round.keys),
                round.visited,
                round.stored,
                round.duration
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys;

    #[test]
    fn test_summary() {
        let diagnostics = Diagnostics {
            rounds: vec![
                Round {
                    keys: keys(["a"]),
                    visited: 3,
                    stored: 3,
                    duration: Duration::from_millis(1),
                },
                Round {
                    keys: keys(["b", "c"]),
                    visited: 3,
                    stored: 2,
                    duration: Duration::from_millis(2),
                },
            ],
        };

        assert_eq!(diagnostics.computed(), keys(["a", "b", "c"]));
        assert_eq!(diagnostics.round_of("c"), Some(1));
        assert_eq!(diagnostics.round_of("z"), None);
        assert_eq!(diagnostics.stored(), 5);
        assert_eq!(diagnostics.duration(), Duration::from_millis(3));
        assert!(diagnostics.to_string().starts_with("round 0: {a} over 3 nodes"));
    }

    #[test]
    fn test_empty() {
        let diagnostics = Diagnostics::default();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.to_string(), "nothing to compute\n");
    }
}
