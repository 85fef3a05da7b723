use super::request::parse_request;
use super::response::write_response;
use crate::dispatcher::{Dispatcher, Response as DispatchResponse};
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use tracing::warn;

/// `may_minihttp` service that hands every request to a [`Dispatcher`]
///
/// One clone runs per connection; clones share the dispatcher.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let response = match parse_request(req) {
            Ok(request) => self.dispatcher.dispatch(&request),
            Err(err) => {
                warn!(error = %err, "Rejecting unparseable HTTP request");
                let mut response = DispatchResponse::new();
                response.status = err.status_code();
                response.set_text(err.to_string());
                response
            }
        };
        write_response(res, response);
        Ok(())
    }
}
