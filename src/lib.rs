pub mod backend;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod links;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod transport;

pub use backend::BackendClient;
pub use client::VripperClient;
pub use config::ClientConfig;
pub use connection::{ChannelHandle, ConnectionProvider};
pub use error::{init_tracing, ClientError, Result};
pub use events::{CommandEnvelope, CommandKind, Interest, ServerEvent, Topic};
pub use links::ThreadLink;
pub use reconcile::post_grid::PostGrid;
pub use reconcile::thread_picker::{AutoPick, PickerPhase, ThreadPicker};
pub use registry::{Subscription, SubscriptionRegistry, SubscriptionStream};
pub use session::{PostGridWatch, ThreadWatch};
pub use transport::{Connector, WsConnector};
