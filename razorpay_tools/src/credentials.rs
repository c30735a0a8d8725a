use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use kk_common::Secret;

use crate::RazorpayApiError;

#[derive(Clone)]
pub struct ApiCredentials {
    pub key_id: String,
    pub key_secret: Secret<String>,
}

impl ApiCredentials {
    pub fn new<S1: Into<String>, S2: Into<String>>(key_id: S1, key_secret: S2) -> Self {
        Self { key_id: key_id.into(), key_secret: Secret::new(key_secret.into()) }
    }
}

impl Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiCredentials({}, {})", self.key_id, self.key_secret)
    }
}

/// A fixed set of API key pairs handed out in round-robin order.
///
/// The ring is cheap to clone and all clones share the same cursor. Lookup by key id is used for follow-up calls
/// against an order, which must always be signed with the key that created it.
#[derive(Clone, Debug)]
pub struct CredentialRing {
    credentials: Arc<Vec<ApiCredentials>>,
    cursor: Arc<AtomicUsize>,
}

impl CredentialRing {
    pub fn new(credentials: Vec<ApiCredentials>) -> Self {
        Self::starting_at(credentials, 0)
    }

    pub fn starting_at(credentials: Vec<ApiCredentials>, start: usize) -> Self {
        Self { credentials: Arc::new(credentials), cursor: Arc::new(AtomicUsize::new(start)) }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn next_credentials(&self) -> Result<&ApiCredentials, RazorpayApiError> {
        if self.credentials.is_empty() {
            return Err(RazorpayApiError::NoCredentials);
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(&self.credentials[i % self.credentials.len()])
    }

    pub fn find(&self, key_id: &str) -> Result<&ApiCredentials, RazorpayApiError> {
        self.credentials.iter().find(|c| c.key_id == key_id).ok_or_else(|| RazorpayApiError::UnknownKey(key_id.into()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiCredentials> {
        self.credentials.iter()
    }
}
