//! Edge-triggered submission inference.
//!
//! The host page clears its input when a prompt is sent, so a nonempty read
//! followed by an empty one is taken as a submission of the last nonempty
//! text. Deleting the whole draft by hand looks identical and also fires.

#[derive(Debug, Default)]
pub struct SubmissionDetector {
    snapshot: Option<String>,
}

impl SubmissionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read. Returns the submitted text on a nonempty to empty
    /// transition.
    pub fn observe(&mut self, current: &str) -> Option<String> {
        if current.trim().is_empty() {
            return self.snapshot.take();
        }
        self.snapshot = Some(current.to_string());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(reads: &[&str]) -> Vec<String> {
        let mut detector = SubmissionDetector::new();
        reads
            .iter()
            .filter_map(|read| detector.observe(read))
            .collect()
    }

    #[test]
    fn fires_once_with_last_nonempty_text() {
        assert_eq!(run(&["", "hello", "hello world", ""]), vec!["hello world"]);
    }

    #[test]
    fn all_empty_reads_never_fire() {
        assert!(run(&["", "", "   ", "\n"]).is_empty());
    }

    #[test]
    fn deleting_the_draft_counts_as_a_submission() {
        assert_eq!(run(&["draft text", ""]), vec!["draft text"]);
    }

    #[test]
    fn whitespace_is_empty() {
        assert_eq!(run(&["hi", "  \t"]), vec!["hi"]);
    }

    #[test]
    fn one_submission_per_transition() {
        let fired = run(&["a", "", "", "b", "bc", "", "c", ""]);
        assert_eq!(fired, vec!["a", "bc", "c"]);
    }
}
