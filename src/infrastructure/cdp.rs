//! Chrome DevTools Protocol implementation of the browser traits.

pub mod client;
pub mod launcher;
pub mod page;
pub mod protocol;

pub use client::CDPClient;
pub use launcher::{ChromeBrowser, ChromeLauncher};
pub use page::CdpPage;
