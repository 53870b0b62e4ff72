//! The per-line transform.
//!
//! A transform is a pure function from one input line to one output line.
//! It cannot fail: the codec has already turned arbitrary bytes into a
//! `&str`, and whatever the transform returns is written back verbatim.

/// Maps one input line to one output line.
///
/// `Send + Sync + 'static` because a single transform is shared by every
/// session task on the runtime.
///
/// Any `Fn(&str) -> String` closure is a transform:
///
/// ```rust
/// use lineforge_protocol::LineTransform;
///
/// let reverse = |line: &str| line.chars().rev().collect::<String>();
/// assert_eq!(reverse.transform("abc"), "cba");
/// ```
pub trait LineTransform: Send + Sync + 'static {
    fn transform(&self, line: &str) -> String;
}

impl<F> LineTransform for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn transform(&self, line: &str) -> String {
        self(line)
    }
}

/// Unicode-aware uppercasing. The server's default transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl LineTransform for Uppercase {
    fn transform(&self, line: &str) -> String {
        line.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_ascii_and_unicode() {
        assert_eq!(Uppercase.transform("hello, world"), "HELLO, WORLD");
        assert_eq!(Uppercase.transform("straße"), "STRASSE");
        assert_eq!(Uppercase.transform(""), "");
    }

    #[test]
    fn test_uppercase_keeps_replacement_character() {
        assert_eq!(Uppercase.transform("a\u{FFFD}b"), "A\u{FFFD}B");
    }

    #[test]
    fn test_closure_is_a_transform() {
        let shout = |line: &str| format!("{line}!");
        let boxed: Box<dyn LineTransform> = Box::new(shout);
        assert_eq!(boxed.transform("hey"), "hey!");
    }
}
