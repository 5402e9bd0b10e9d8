mod body;
mod codec;
mod forward;
mod server;

pub use body::{FixedBody, read_fixed_body, relay_until_close};
pub use codec::{
    ACCEPTED_METHODS, HeaderLine, HeaderLineError, HeaderList, ParsedRequest, ReadLimits,
    ReadOutcome, RequestError, read_request,
};
pub use forward::{ForwardStats, encode_forward_request, forward_request};
pub use server::{ProxyMode, handle_http};

#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use super::codec::{Progress, RequestParser};

    /// Feeds `data` to the request parser twice, once whole and once split at
    /// `split`, and checks both runs agree.
    pub fn parse_request_head(data: &[u8], split: usize) {
        let whole = run(&[data]);
        let split = split.min(data.len());
        let (first, second) = data.split_at(split);
        let pieces = run(&[first, second]);
        assert_eq!(whole, pieces, "chunking changed the parse result");
    }

    fn run(chunks: &[&[u8]]) -> Option<Result<(usize, super::ParsedRequest), String>> {
        let mut parser = RequestParser::new(64 * 1024);
        let mut offset = 0;
        for chunk in chunks {
            match parser.feed(chunk) {
                Ok(Progress::NeedMore) => offset += chunk.len(),
                Ok(Progress::HeadComplete { consumed }) => {
                    return Some(
                        parser
                            .finish()
                            .map(|request| (offset + consumed, request))
                            .map_err(|err| err.to_string()),
                    );
                }
                Err(err) => return Some(Err(err.to_string())),
            }
        }
        None
    }
}
