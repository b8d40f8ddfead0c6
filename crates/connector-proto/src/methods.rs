//! Fully-qualified gRPC method paths of the control API, used in logs and
//! tracing spans so method names stay in sync with the proto definitions.

/// `RemoteConnection/ExposeService`
pub const METHOD_EXPOSE_SERVICE: &str = "connector.v1.RemoteConnection/ExposeService";

/// `RemoteConnection/DestroyService`
pub const METHOD_DESTROY_SERVICE: &str = "connector.v1.RemoteConnection/DestroyService";

/// `RemoteConnection/ListServices`
pub const METHOD_LIST_SERVICES: &str = "connector.v1.RemoteConnection/ListServices";
