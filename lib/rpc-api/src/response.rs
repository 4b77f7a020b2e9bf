use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome code of a remote call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Success,
    Fail,
}

impl ResponseCode {
    /// Numeric status carried in the response
    pub fn code(&self) -> u16 {
        match self {
            ResponseCode::Success => 200,
            ResponseCode::Fail => 500,
        }
    }

    /// Short human readable description
    pub fn message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "The remote call is successful",
            ResponseCode::Fail => "The remote call is fail",
        }
    }
}

/// RpcResponse is the result of one remote call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// Id of the request this answers; absent on generic failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Numeric status
    pub code: u16,

    /// Short description of the status
    pub message: String,

    /// Returned value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Build a successful response for the given request
    pub fn success(data: Option<Value>, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            code: ResponseCode::Success.code(),
            message: ResponseCode::Success.message().to_string(),
            data,
        }
    }

    /// Build a failed response
    pub fn fail(code: ResponseCode) -> Self {
        Self {
            request_id: None,
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success.code()
    }
}
