/// Renders a compact, single-line description of a potentially big message for log lines.
pub trait MessageSummary {
    fn summary(&self) -> String;
}

impl<T> MessageSummary for &[T]
where T: MessageSummary
{
    fn summary(&self) -> String {
        match self {
            [] => "{}".to_string(),
            [first, .., last] if self.len() > 5 => format!("{} ... {}", first.summary(), last.summary()),
            _ => self.iter().map(|x| x.summary()).collect::<Vec<_>>().join(","),
        }
    }
}

impl<T> MessageSummary for Option<T>
where T: MessageSummary
{
    fn summary(&self) -> String {
        match self {
            None => "None".to_string(),
            Some(x) => format!("Some({})", x.summary()),
        }
    }
}
