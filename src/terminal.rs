//! Terminal presentation of the live access pass.
//!
//! Renders a banner (payload, token, validity and optionally a QR block)
//! each time a new code is displayed, and a one-line countdown bar on every
//! tick.

use std::io::Write;

use chrono::Local;
use issy_access::access::qr;
use issy_access::access::{GeneratedCode, RotationConfig, Urgency, TIME_STEP};
use tokio::sync::watch;

const BAR_WIDTH: usize = 20;

/// Multi-line block shown on rotation.
pub fn render_code(code: &GeneratedCode, show_qr: bool) -> String {
    let mut out = String::new();
    if show_qr {
        match qr::payload_to_qr_text(&code.code) {
            Ok(block) => {
                out.push_str(&block);
                out.push('\n');
            }
            Err(e) => log::warn!("QR rendering failed: {}", e),
        }
    }
    out.push_str(&format!("Access code  {}\n", code.code));
    out.push_str(&format!("Token        {}\n", code.token));
    if let Some(expires) = code.expires_at_utc() {
        out.push_str(&format!(
            "Valid until  {}\n",
            expires.with_timezone(&Local).format("%H:%M:%S")
        ));
    }
    out
}

/// Countdown bar: filled cells are the remaining share of the window.
pub fn render_countdown(remaining_seconds: u64, urgency: Urgency) -> String {
    let remaining = remaining_seconds.min(TIME_STEP);
    let filled = (remaining as usize * BAR_WIDTH) / TIME_STEP as usize;
    let marker = match urgency {
        Urgency::Normal => ' ',
        Urgency::Warning => '!',
        Urgency::Critical => '×',
    };
    format!(
        "[{}{}] {:>2}s {}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        remaining,
        marker
    )
}

/// Print rotations and countdown until the engine's channels close.
pub async fn run_display(
    codes: watch::Receiver<Option<GeneratedCode>>,
    countdown: watch::Receiver<u64>,
    config: RotationConfig,
    show_qr: bool,
) {
    run_display_to(std::io::stdout(), codes, countdown, config, show_qr).await
}

/// Same as [`run_display`] with an explicit writer. Stops on the first
/// write failure, e.g. a closed pipe.
pub async fn run_display_to<W: Write>(
    mut out: W,
    mut codes: watch::Receiver<Option<GeneratedCode>>,
    mut countdown: watch::Receiver<u64>,
    config: RotationConfig,
    show_qr: bool,
) {
    loop {
        let written = tokio::select! {
            changed = codes.changed() => {
                if changed.is_err() {
                    break;
                }
                let code = codes.borrow_and_update().clone();
                match code {
                    Some(code) => write!(out, "\r\n{}\n", render_code(&code, show_qr)),
                    None => Ok(()),
                }
            }
            changed = countdown.changed() => {
                if changed.is_err() {
                    break;
                }
                let remaining = *countdown.borrow_and_update();
                let line = render_countdown(remaining, config.urgency(remaining));
                write!(out, "\r{}", line)
            }
        };
        if let Err(e) = written.and_then(|_| out.flush()) {
            log::warn!("terminal output failed, stopping display: {}", e);
            break;
        }
    }
}
