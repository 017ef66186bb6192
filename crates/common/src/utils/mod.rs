mod encoding;
mod headers;
mod id;

pub use encoding::{EncodedBody, encode_body, encode_body_for_content_type, is_text_like};
pub use headers::{
    canonical_header_name, headers_to_map, map_to_headers, relay_header_filter,
    websocket_header_filter,
};
pub use id::{derive_local_id, is_usable_hardware_address};
