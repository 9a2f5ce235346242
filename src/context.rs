use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Identity of the party submitting a request, as attested by the host.
///
/// `peer_org` is the organization of the peer executing the request. Private
/// partitions are readable only when it matches the partition owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerContext {
    org_id: String,
    client_id: String,
    peer_org: String,
}

impl CallerContext {
    /// A caller whose request executes on a peer of its own organization.
    pub fn new(org_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let org_id = org_id.into();
        Self {
            peer_org: org_id.clone(),
            org_id,
            client_id: client_id.into(),
        }
    }

    /// Route the request to a peer of another organization.
    pub fn on_peer(mut self, peer_org: impl Into<String>) -> Self {
        self.peer_org = peer_org.into();
        self
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn peer_org(&self) -> &str {
        &self.peer_org
    }
}

/// Arguments delivered outside of the durable request record.
///
/// Kept apart from ordinary string arguments so that secret material can
/// never end up in a replicated transaction. Values are wiped on drop.
#[derive(Default)]
pub struct ConfidentialInput {
    fields: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl ConfidentialInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.fields.insert(name.into(), Zeroizing::new(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for ConfidentialInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}
