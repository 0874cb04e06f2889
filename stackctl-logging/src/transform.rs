use std::borrow::Cow;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Repair a line that was truncated mid-capture: such a line ends with an
/// ellipsis while an opening double quote inside it was never closed. The
/// dangling quote is dropped and the ellipsis kept, so downstream consumers
/// do not see a quote that never closes.
pub fn rewrite_truncated_quote(line: &str) -> Cow<'_, str> {
    if !line.ends_with("...") {
        return Cow::Borrowed(line);
    }
    if line.matches('"').count() % 2 == 0 {
        return Cow::Borrowed(line);
    }
    match line.rfind('"') {
        Some(idx) => {
            let mut fixed = String::with_capacity(line.len() - 1);
            fixed.push_str(&line[..idx]);
            fixed.push_str(&line[idx + 1..]);
            Cow::Owned(fixed)
        }
        None => Cow::Borrowed(line),
    }
}

/// Transformer stage: drain the line channel into the sink, rewriting each
/// line on the way through. Ends once every tailer has dropped its sender
/// and the buffered lines are flushed.
pub(crate) async fn pump<W>(mut rx: mpsc::Receiver<String>, mut sink: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let line = rewrite_truncated_quote(&line);
        if sink.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if sink.write_all(b"\n").await.is_err() {
            break;
        }
    }
    let _ = sink.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_quote_is_dropped() {
        let line = r#"10.0.0.1 - GET /health agent="Mozilla/5.0 (Windo..."#;
        assert_eq!(
            rewrite_truncated_quote(line),
            "10.0.0.1 - GET /health agent=Mozilla/5.0 (Windo..."
        );
    }

    #[test]
    fn test_earlier_balanced_quotes_survive() {
        let line = r#"req="GET /" agent="curl/8..."#;
        assert_eq!(
            rewrite_truncated_quote(line),
            r#"req="GET /" agent=curl/8..."#
        );
    }

    #[test]
    fn test_balanced_line_untouched() {
        let line = r#"req="GET /" status=200"#;
        assert_eq!(rewrite_truncated_quote(line), line);
    }

    #[test]
    fn test_ellipsis_without_quotes_untouched() {
        let line = "slow request, retrying...";
        assert_eq!(rewrite_truncated_quote(line), line);
    }

    #[test]
    fn test_unbalanced_quote_without_ellipsis_untouched() {
        let line = r#"agent="Mozilla/5.0 (Windo"#;
        assert_eq!(rewrite_truncated_quote(line), line);
    }

    #[test]
    fn test_empty_line_untouched() {
        assert_eq!(rewrite_truncated_quote(""), "");
    }
}
