mod headers;
mod request;
mod window;

pub use headers::{HeaderLine, HeaderLineError, HeaderList};
pub use request::{
    ACCEPTED_METHODS, ParsedRequest, ReadLimits, ReadOutcome, RequestError, read_request,
};
#[cfg(feature = "fuzzing")]
pub(crate) use request::{Progress, RequestParser};

#[cfg(test)]
pub(crate) use request::tests::{ChunkedReader, LIMITS as TEST_LIMITS};
