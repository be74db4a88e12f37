//! Scan direction and bound inclusion

/// Order in which a range scan visits keys or records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanDirection {
    /// Ascending key order, or insertion order for natural scans
    #[default]
    Forward,
    /// Descending key order, or reverse insertion order for natural scans
    Backward,
}

impl ScanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanDirection::Forward => "forward",
            ScanDirection::Backward => "backward",
        }
    }
}

/// Whether a scan's bounds are themselves eligible as matches
///
/// Scans here only ever carry a start bound, so the two variants that
/// include the start key behave alike, as do the two that exclude it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundInclusion {
    #[default]
    IncludeStartKeyOnly,
    IncludeEndKeyOnly,
    IncludeBothStartAndEndKeys,
    ExcludeBothStartAndEndKeys,
}

impl BoundInclusion {
    /// Whether a key equal to the start key is returned
    pub fn includes_start(&self) -> bool {
        matches!(
            self,
            BoundInclusion::IncludeStartKeyOnly | BoundInclusion::IncludeBothStartAndEndKeys
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoundInclusion::IncludeStartKeyOnly => "includeStartKeyOnly",
            BoundInclusion::IncludeEndKeyOnly => "includeEndKeyOnly",
            BoundInclusion::IncludeBothStartAndEndKeys => "includeBothStartAndEndKeys",
            BoundInclusion::ExcludeBothStartAndEndKeys => "excludeBothStartAndEndKeys",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_inclusion() {
        assert!(BoundInclusion::IncludeStartKeyOnly.includes_start());
        assert!(BoundInclusion::IncludeBothStartAndEndKeys.includes_start());
        assert!(!BoundInclusion::IncludeEndKeyOnly.includes_start());
        assert!(!BoundInclusion::ExcludeBothStartAndEndKeys.includes_start());
    }

    #[test]
    fn test_default_is_start_only() {
        assert_eq!(BoundInclusion::default(), BoundInclusion::IncludeStartKeyOnly);
    }
}
