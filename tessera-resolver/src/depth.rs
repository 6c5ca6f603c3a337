//! Remaining hop budget of a resolution.

use std::fmt;

/// Remaining hops a resolution may take.
///
/// Crossing a link and descending into a field each cost one hop. A link is
/// still followed at `Remaining(0)` and left alone once the budget is
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    #[default]
    Unbounded,
    Remaining(i64),
}

impl Depth {
    pub fn limited(hops: i64) -> Self {
        Depth::Remaining(hops)
    }

    /// True once links must no longer be followed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Depth::Remaining(n) if *n < 0)
    }

    /// Budget one hop further down.
    pub fn descend(self) -> Self {
        match self {
            Depth::Unbounded => Depth::Unbounded,
            Depth::Remaining(n) => Depth::Remaining(n.saturating_sub(1)),
        }
    }
}

impl From<i64> for Depth {
    fn from(hops: i64) -> Self {
        Depth::Remaining(hops)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Unbounded => write!(f, "unbounded"),
            Depth::Remaining(n) => write!(f, "{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descend_and_exhaustion() {
        let depth = Depth::limited(0);
        assert!(!depth.is_exhausted());
        assert!(depth.descend().is_exhausted());
        assert_eq!(depth.descend().descend(), Depth::Remaining(-2));
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let mut depth = Depth::default();
        for _ in 0..100 {
            depth = depth.descend();
        }
        assert!(!depth.is_exhausted());
        assert_eq!(depth.to_string(), "unbounded");
    }
}
