//! # ISSY Resident Access Pass
//!
//! Time-stepped one-time codes proving a resident's identity at an access
//! point:
//!
//! - **Code generation** – HMAC-SHA256 over `"<identity>:<counter>"`, dynamic
//!   truncation to a 6-digit token, `ISSY-R-` display payload
//! - **Rotation engine** – polls a clock, regenerates exactly once per
//!   10-second step, publishes the countdown and fresh codes
//! - **Verification** – payload parsing and drift-tolerant token checks for
//!   the access-point side
//! - **QR rendering** – PNG / SVG / data-URI output of the display payload

pub mod access;
