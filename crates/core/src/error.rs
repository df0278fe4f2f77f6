/// Why a single outbound fetch failed.
///
/// These never abort sibling fetches; the owning batch records them and reports one
/// [`CdsError::BatchFailed`] once every sibling has finished.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("request {url} failed ({status}): {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to read response body from {url}: {reason}")]
    BodyRead { url: String, reason: String },
    #[error("failed to decompress response body from {url}: {reason}")]
    Decompress { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CdsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid classification pattern {name}: {source}")]
    Pattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("FHIR decode error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("{group}: {failed} of {total} fetches failed")]
    BatchFailed {
        group: &'static str,
        failed: usize,
        total: usize,
    },
    #[error("task in group {group} did not complete: {reason}")]
    TaskJoin { group: &'static str, reason: String },
    #[error("EHR write failed (status {status}): {body}")]
    WriteBack { status: u16, body: String },
    #[error("write-back request failed: {0}")]
    WriteBackFetch(FetchFailure),
    #[error("failed to serialize write-back payload: {0}")]
    Serialization(serde_json::Error),
}

pub type CdsResult<T> = std::result::Result<T, CdsError>;
