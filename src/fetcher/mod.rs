//! External download tool handling
//!
//! The actual download protocol is delegated to an external executable. This
//! module provides a trait-based architecture so hosts can plug in their own
//! tool and tests can substitute mocks.
//!
//! ## Architecture
//!
//! The core abstraction is the [`UrlFetcher`] trait, which defines the
//! interface for one fetch attempt into a scratch directory. The provided
//! implementation is:
//!
//! - [`Aria2cFetcher`]: invokes the external `aria2c` binary
//!
//! The executor bounds every `fetch` call with the configured time limit;
//! implementations must terminate their external process when the returned
//! future is dropped (see [`UrlFetcher::fetch`]).

mod aria2c;
mod traits;

pub use aria2c::Aria2cFetcher;
pub use traits::UrlFetcher;
