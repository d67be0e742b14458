//! OS signal wiring for the loops' cancellation token.

use tokio_util::sync::CancellationToken;

/// Token cancelled by the first SIGINT or SIGTERM.
///
/// Listeners are installed before returning, so a signal arriving right
/// after the call is not lost. Later signals are logged and otherwise
/// ignored: shutdown is already in progress.
pub fn signal_token() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    else => break,
                };
                if trigger.is_cancelled() {
                    tracing::debug!(signal = name, "shutdown already in progress");
                } else {
                    tracing::info!(signal = name, "caught signal, shutting down");
                    trigger.cancel();
                }
            }
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !trigger.is_cancelled() {
                tracing::info!(signal = "ctrl-c", "caught signal, shutting down");
                trigger.cancel();
            }
        }
    });

    Ok(token)
}
