//! In-process access-control and delivery core—TTL caching, sliding-window and token-bucket
//! admission, shared-credential lifecycle, and chunked fan-out delivery in one crate built for
//! production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod content;
pub mod delivery;
pub mod error;
pub mod id;
pub mod limit;
pub mod obs;
pub mod pipeline;
pub mod store;
pub mod task;
pub mod token;

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

pub use time;
