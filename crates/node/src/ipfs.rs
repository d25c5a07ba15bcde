//! IPFS/IPNS client used for NFT metadata pinning. Constructor-injected
//! through the block processor; the core stays correct when the daemon is
//! unreachable (the mint succeeds and the pin is deferred).

use sha3::{Digest, Keccak256};

#[derive(thiserror::Error, Debug)]
pub enum IpfsError {
    #[error("ipfs http error: {0}")]
    Http(String),
    #[error("unexpected ipfs response: {0}")]
    BadResponse(String),
}

pub trait IpfsClient: Send + Sync {
    /// Pin a metadata blob, returning its CID.
    fn upload(&self, data: &[u8], nft_index: u64) -> Result<String, IpfsError>;
    /// Create an IPNS key for later metadata mutation; returns the IPNS id.
    fn generate_ipns_key(&self, name: &str) -> Result<String, IpfsError>;
}

/// Content hash committed into the NFT leaf: keccak over the CID string.
pub fn content_hash_from_cid(cid: &str) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(cid.as_bytes());
    let out = h.finalize();
    let mut a = [0u8; 32];
    a.copy_from_slice(&out);
    a
}

/// Fallback content hash when pinning is deferred: keccak over the metadata
/// bytes themselves, so the leaf still commits to the content.
pub fn content_hash_from_metadata(metadata: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(metadata);
    let out = h.finalize();
    let mut a = [0u8; 32];
    a.copy_from_slice(&out);
    a
}

/// HTTP API client against a kubo-compatible daemon.
pub struct HttpIpfsClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpIpfsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpIpfsClient {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(serde::Deserialize)]
struct KeygenResponse {
    #[serde(rename = "Id")]
    id: String,
}

impl IpfsClient for HttpIpfsClient {
    fn upload(&self, data: &[u8], nft_index: u64) -> Result<String, IpfsError> {
        let part = reqwest::blocking::multipart::Part::bytes(data.to_vec())
            .file_name(format!("{nft_index}.json"));
        let form = reqwest::blocking::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{}/api/v0/add", self.base_url))
            .multipart(form)
            .send()
            .map_err(|e| IpfsError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| IpfsError::Http(e.to_string()))?;
        let body: AddResponse = resp
            .json()
            .map_err(|e| IpfsError::BadResponse(e.to_string()))?;
        Ok(body.hash)
    }

    fn generate_ipns_key(&self, name: &str) -> Result<String, IpfsError> {
        let resp = self
            .client
            .post(format!("{}/api/v0/key/gen?arg={name}", self.base_url))
            .send()
            .map_err(|e| IpfsError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| IpfsError::Http(e.to_string()))?;
        let body: KeygenResponse = resp
            .json()
            .map_err(|e| IpfsError::BadResponse(e.to_string()))?;
        Ok(body.id)
    }
}

#[cfg(test)]
pub struct StaticIpfsClient {
    pub cid: String,
    pub ipns_id: String,
}

#[cfg(test)]
impl IpfsClient for StaticIpfsClient {
    fn upload(&self, _data: &[u8], _nft_index: u64) -> Result<String, IpfsError> {
        Ok(self.cid.clone())
    }

    fn generate_ipns_key(&self, _name: &str) -> Result<String, IpfsError> {
        Ok(self.ipns_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hashes_differ_by_source() {
        assert_ne!(
            content_hash_from_cid("bafyone"),
            content_hash_from_cid("bafytwo")
        );
        assert_ne!(
            content_hash_from_cid("bafyone"),
            content_hash_from_metadata(b"bafyone-but-raw")
        );
    }
}
