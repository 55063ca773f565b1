use {
    crate::{BucketId, FileMetadata, FileRecord, Fingerprint, ObjectIndex, RemoteObjectId},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

pub trait RequestToResponse {
    type Response;
    const PATH: &'static str;
}
macro_rules! response_type {
    ($request:ty, $response:ty, $version:literal) => {
        impl RequestToResponse for $request {
            type Response = $response;
            const PATH: &'static str = concat!("/api/", $version, "/", stringify!($request));
        }
    };
}

pub type Response<Request> = <Request as RequestToResponse>::Response;

/// What the server sends back for every API request: the response or an error message.
pub type ApiResult<T> = Result<T, String>;

/// Records a file entry for an object that has been uploaded already.
///
/// The server rejects the request if the object is not present in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFile {
    pub bucket: BucketId,
    pub object_id: RemoteObjectId,
    pub index: ObjectIndex,
    pub fingerprint: Fingerprint,
    pub metadata: FileMetadata,
}
response_type!(RegisterFile, FileRecord, "v1");

#[inline]
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
}

#[inline]
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy()).map(|(value, _len)| value)
}
