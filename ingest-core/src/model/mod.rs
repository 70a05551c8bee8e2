pub mod event;
pub mod row;

pub use event::{ChannelCallback, DataPoint, DataPointEvent, DataPointValue, EventCompletionCallback, TagMap};
pub use row::{RowKey, RowSpec, TimedString};
