//! Download requests and the ordered batch handed to the orchestrator.

/// Immutable pairing of a logical file name with its source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    name: String,
    url: String,
}

impl DownloadRequest {
    /// Creates a request. The name may or may not carry an extension.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Logical file name chosen by the caller.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Insertion-ordered set of requests keyed by logical name.
///
/// Inserting a name that is already present replaces its URL but keeps the
/// original position, so sequential runs stay in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadBatch {
    requests: Vec<DownloadRequest>,
}

impl DownloadBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a request. Returns the previous URL for `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) -> Option<String> {
        let name = name.into();
        let url = url.into();
        if let Some(existing) = self.requests.iter_mut().find(|r| r.name == name) {
            return Some(std::mem::replace(&mut existing.url, url));
        }
        self.requests.push(DownloadRequest { name, url });
        None
    }

    /// Returns the URL registered for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.requests
            .iter()
            .find(|r| r.name == name)
            .map(DownloadRequest::url)
    }

    /// Returns true if `name` is already in the batch.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns true if some request already points at `url`.
    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.requests.iter().any(|r| r.url == url)
    }

    /// Number of requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the batch holds no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Iterates requests in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, DownloadRequest> {
        self.requests.iter()
    }
}

impl<N, U> FromIterator<(N, U)> for DownloadBatch
where
    N: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, U)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (name, url) in iter {
            batch.insert(name, url);
        }
        batch
    }
}

impl<'a> IntoIterator for &'a DownloadBatch {
    type Item = &'a DownloadRequest;
    type IntoIter = std::slice::Iter<'a, DownloadRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.iter()
    }
}
