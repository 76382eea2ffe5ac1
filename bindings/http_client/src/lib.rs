mod client;
mod error;

pub use client::HTTP_GET_OPERATION_ID;

pub mod prelude {
    pub use crate::client::HttpClientInstrumented as HttpClient;
    pub use crate::error::NetworkError;

    // Re-exported so that scenarios don't need to depend on `url` directly to build request URLs.
    pub use url::Url;
}
