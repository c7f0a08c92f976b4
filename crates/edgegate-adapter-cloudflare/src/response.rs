use edgegate_core::body::Body;
use edgegate_core::error::EdgeError;
use edgegate_core::http::Response;
use futures_util::StreamExt;
use worker::{Error as WorkerError, Response as CfResponse};

/// Convert a core response into a Workers response. Repeated headers are appended, not merged.
pub fn from_core_response(response: Response) -> Result<CfResponse, EdgeError> {
    let (parts, body) = response.into_parts();

    let cf_response = match body {
        Body::Once(bytes) if bytes.is_empty() => {
            CfResponse::empty().map_err(EdgeError::internal)?
        }
        Body::Once(bytes) => CfResponse::from_bytes(bytes.to_vec()).map_err(EdgeError::internal)?,
        Body::Stream(stream) => {
            let worker_stream = stream
                .map(|res| match res {
                    Ok(bytes) => Ok::<Vec<u8>, WorkerError>(bytes.to_vec()),
                    Err(err) => Err(WorkerError::RustError(err.to_string())),
                })
                .boxed_local();
            CfResponse::from_stream(worker_stream).map_err(EdgeError::internal)?
        }
    };

    let mut cf_response = cf_response.with_status(parts.status.as_u16());
    let headers = cf_response.headers_mut();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers
                .append(name.as_str(), value)
                .map_err(EdgeError::internal)?;
        }
    }
    Ok(cf_response)
}
