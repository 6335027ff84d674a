pub mod model;
pub mod decoder;
pub mod rates;
pub mod enricher;
pub mod dispatch;
pub mod pipeline;
pub mod memory;

pub use model::{EnrichedRecord, FlightLeg, Period, SearchRecord};
pub use decoder::{decode, decode_fields, DecodeFailure, DecodeReason};
pub use rates::{RateError, RateResolver, RateStore, StoreError, BASE_CURRENCY};
pub use enricher::{enrich, EnrichError};
pub use dispatch::{ChannelName, ChannelTopics, DeliveryId, Dispatcher, MessageSink, PublishError, SinkError};
pub use pipeline::{
    order_by_search_time, BatchReport, BatchSummary, ChannelOutcome, LineFailure, LineReport, LineStatus, Pipeline,
    RawLine,
};
