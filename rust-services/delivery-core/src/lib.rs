//! Multi-channel delivery core
//!
//! - [`resolver`]: ordered failover across channel descriptors, falling back
//!   to the [`sink`] when nothing is reachable
//! - [`dispatcher`]: sends through a resolved channel and normalizes the
//!   provider response into a [`DeliveryOutcome`](herald_types::DeliveryOutcome)
//! - [`fanout`]: push routing by target shape and topic subscriptions
//! - [`ledger`]: append-only, process-lifetime record of every dispatch
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod ledger;
pub mod resolver;
pub mod sink;

pub use channel::{Channel, ChannelConnector, ProviderResponse, RecipientResult, StaticConnector, SubscriptionResponse};
pub use dispatcher::DeliveryDispatcher;
pub use error::{ChannelError, DeliveryError, LedgerError};
pub use fanout::FanOutResolver;
pub use ledger::{DeliveryLedger, DeliveryRecord, DeliveryStatus, LedgerEntry, LedgerStats};
pub use resolver::{ChannelGroup, ProbeFailure, ResolvedChannel, TransportResolver};
pub use sink::SinkChannel;
