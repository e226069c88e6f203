//! Traffic recording and the on-disk record format used for playback.
//!
//! # Module Structure
//!
//! - `codec` - YAML encoding of one response or message per file
//! - `store` - Timestamp-named record directories

mod codec;
mod store;

pub use codec::{
    decode_message, decode_response, encode_message, encode_response, read_message_record,
    read_response_record, write_message_record, write_response_record,
};
pub use store::{
    list_record_files, parse_record_name, record_timestamp, RecordDir, RecordFile,
    RECORD_EXTENSION,
};
