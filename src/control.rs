use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EXIT_COMMAND: &str = "exit";

/// Reads commands line by line and cancels `shutdown` on `exit`.
/// Returns once shutdown was requested, the input ends, or `shutdown` is
/// cancelled by someone else.
pub async fn watch_commands<R>(input: R, shutdown: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
                    info!("exit requested, stopping server");
                    shutdown.cancel();
                    return;
                }

                if !line.trim().is_empty() {
                    warn!(command = line.trim(), "unknown command");
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "control channel failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_cancels() {
        let token = CancellationToken::new();
        watch_commands(&b"status\n  EXIT  \nignored\n"[..], token.clone()).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn end_of_input_does_not_cancel() {
        let token = CancellationToken::new();
        watch_commands(&b"help\n\nexitnow\n"[..], token.clone()).await;
        assert!(!token.is_cancelled());
    }
}
