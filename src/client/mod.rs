//! Client side of the engine (spec §4.7–§4.9, §2 "Client façade"):
//! outbound request state machine, Basic/Digest auth, cookie jar, and
//! URL parsing.

pub mod auth;
pub mod connection;
pub mod cookies;
pub mod response;
pub mod url;

pub use connection::{Client, ClientState, RequestQuery};
pub use cookies::CookieJar;
pub use response::HttpResponse;
pub use url::{parse_url, ParsedUrl};
