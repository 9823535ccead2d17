use std::fmt;

/// Monetary amount in integer minor currency units (cents).
///
/// The single canonical money representation inside the engine. Collaborator
/// payloads that carry both a decimal dollar amount and a pre-multiplied
/// cents field are resolved at the boundary via [`Cents::from_dual`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    serde::Deserialize,
    serde::Serialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Self = Self(0);

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).max(0))
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Resolves the dual decimal/integer-cents representation some partner
    /// payloads carry. The cents field is authoritative; a disagreeing
    /// decimal field is logged and ignored.
    pub fn from_dual(decimal: Option<f64>, cents: Option<i64>) -> Option<Self> {
        match (decimal, cents) {
            (decimal, Some(cents)) => {
                if let Some(decimal) = decimal {
                    let derived = (decimal * 100.).round();
                    if derived as i64 != cents {
                        tracing::warn!(decimal, cents, "dual money fields disagree, using cents");
                    }
                }
                Some(Self(cents))
            }
            (Some(decimal), None) => Some(Self((decimal * 100.).round() as i64)),
            (None, None) => None,
        }
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}${}.{:02}", (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}
