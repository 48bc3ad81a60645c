//! Spinner showing how many rules the engine has evaluated so far

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Follow the matcher's event count until cancelled or the count's sender
/// goes away. Purely informational.
pub async fn observe_progress(
    mut events_seen: watch::Receiver<u64>,
    mut cancel: oneshot::Receiver<()>,
    visible: bool,
) {
    let spinner = if visible {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    } else {
        ProgressBar::hidden()
    };
    spinner.set_message("Evaluating build files...");

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            changed = events_seen.changed() => {
                if changed.is_err() {
                    break;
                }
                let seen = *events_seen.borrow_and_update();
                spinner.set_message(format!("Evaluated {} rules", seen));
            }
        }
    }

    spinner.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let (_progress_tx, progress_rx) = watch::channel(0u64);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let observer = tokio::spawn(observe_progress(progress_rx, cancel_rx, false));
        cancel_tx.send(()).unwrap();

        observer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_counter_closes() {
        let (progress_tx, progress_rx) = watch::channel(0u64);
        let (_cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let observer = tokio::spawn(observe_progress(progress_rx, cancel_rx, false));
        progress_tx.send_replace(3);
        drop(progress_tx);

        observer.await.unwrap();
    }
}
