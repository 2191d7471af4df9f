use log::warn;
use crate::Result;

/// Outcome of a best-effort read: the value, or its default when the read
/// failed, plus whether that substitution happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerant<T> {
    pub value: T,
    pub degraded: bool,
}

/// Unwraps `res`, substituting `T::default()` on error.
///
/// The error is logged against `what` so call sites never have to.
pub fn tolerant<T: Default>(what: &str, res: Result<T>) -> Tolerant<T> {
    match res {
        Ok(value) => Tolerant { value, degraded: false },
        Err(e) => {
            warn!("Degraded read of {}: {}", what, e);
            Tolerant {
                value: T::default(),
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_ok_passes_through() {
        let t = tolerant("stored_gestures", Ok(vec![1, 2]));
        assert_eq!(t.value, vec![1, 2]);
        assert!(!t.degraded);
    }

    #[test]
    fn test_error_degrades_to_default() {
        let t: Tolerant<usize> = tolerant("x", Err(Error::Internal("boom".to_string())));
        assert_eq!(t.value, 0);
        assert!(t.degraded);
    }
}
