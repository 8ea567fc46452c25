use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{
    body::{Body, Bytes},
    http::{Request, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use futures_util::{StreamExt, stream};

use crate::metrics;
use crate::pipeline::{Interception, InterceptionPipeline};

// =============================================================================
// Interception Middleware
// =============================================================================

/// Runs the interception pipeline in front of the downstream router.
///
/// This middleware:
/// 1. Classifies the request by path; unmatched requests go straight to `next`
/// 2. Reads the body of matched requests (bounded by the pipeline body limit)
/// 3. Dispatches to the rule's handler and returns its 201 response, or
/// 4. Rebuilds the request with the buffered body and hands it to `next`
///
/// A declined request always reaches `next` with its complete body, including
/// bodies over the limit and bodies whose stream failed part way.
pub async fn interception_middleware(
    State(pipeline): State<InterceptionPipeline>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(rule) = pipeline.classify(req.uri().path()) else {
        return next.run(req).await;
    };

    tracing::debug!(rule = %rule.name(), path = %req.uri().path(), "Request matched interception rule");

    if declared_length(&req).is_some_and(|len| len > pipeline.body_limit()) {
        pipeline.body_too_large(rule);
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match buffer_body(body, pipeline.body_limit()).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::OverLimit(body) => {
            pipeline.body_too_large(rule);
            return next.run(Request::from_parts(parts, body)).await;
        }
        Buffered::Failed { error, body } => {
            pipeline.body_read_failed(rule, error);
            return next.run(Request::from_parts(parts, body)).await;
        }
    };

    match pipeline.dispatch(rule, &bytes).await {
        Interception::Responded(response) => response.into_response(),
        Interception::Declined(_) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
    }
}

fn declared_length(req: &Request<Body>) -> Option<usize> {
    req.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Outcome of reading a body up to a limit.
enum Buffered {
    Complete(Bytes),
    /// The limit was crossed. The body replays what was read, then the rest.
    OverLimit(Body),
    /// The stream errored. The body replays what was read, then the error.
    Failed { error: axum::Error, body: Body },
}

async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;

    while let Some(next) = data.next().await {
        match next {
            Ok(chunk) => {
                len += chunk.len();
                chunks.push(chunk);
                if len > limit {
                    let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                    return Buffered::OverLimit(Body::from_stream(head.chain(data)));
                }
            }
            Err(error) => {
                let replay = Body::from_stream(
                    stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>))
                        .chain(stream::once(async {
                            Err::<Bytes, _>(axum::Error::new("request body stream failed"))
                        })),
                );
                return Buffered::Failed { error, body: replay };
            }
        }
    }

    match chunks.len() {
        0 => Buffered::Complete(Bytes::new()),
        1 => Buffered::Complete(chunks.swap_remove(0)),
        _ => Buffered::Complete(Bytes::from(chunks.concat())),
    }
}

// =============================================================================
// Other Middleware
// =============================================================================

/// Records request count and latency for every request.
pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let started = Instant::now();
    let res = next.run(req).await;
    metrics::record_http_request(&method, res.status().as_u16(), started.elapsed());
    res
}
