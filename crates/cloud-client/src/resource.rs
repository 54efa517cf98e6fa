//! REST collections and list filters

/// A REST collection exposed by the API.
///
/// `name` is the user-facing resource name; it appears verbatim in
/// `failed to find <name> with id "<id>"` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKind {
    pub name: &'static str,
    /// Collection path relative to the API root
    pub collection: &'static str,
}

impl ResourceKind {
    pub const VIRTUAL_MACHINE: Self = Self::new("virtual machine", "/vm/v1/vms");
    pub const FOLDER: Self = Self::new("folder", "/vm/v1/folders");
    pub const DATASTORE: Self = Self::new("datastore", "/vm/v1/datastores");
    pub const NETWORK: Self = Self::new("network", "/vm/v1/networks");
    pub const BACKUP_POLICY: Self = Self::new("backup policy", "/backup/v1/policies");

    pub const fn new(name: &'static str, collection: &'static str) -> Self {
        Self { name, collection }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection, id)
    }
}

/// Query parameters for `list`. The default implementation means no
/// filtering, so `&()` lists everything.
pub trait Filter: Send + Sync {
    fn query(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl Filter for () {}

/// Filter any collection by exact name.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    pub name: Option<String>,
}

impl Filter for NameFilter {
    fn query(&self) -> Vec<(String, String)> {
        self.name
            .iter()
            .map(|name| ("name".to_string(), name.clone()))
            .collect()
    }
}

/// Virtual machine listing filter.
#[derive(Debug, Clone, Default)]
pub struct VirtualMachineFilter {
    pub name: Option<String>,
    pub folder_id: Option<String>,
    pub datastore_id: Option<String>,
    pub power_state: Option<String>,
}

impl Filter for VirtualMachineFilter {
    fn query(&self) -> Vec<(String, String)> {
        [
            ("name", &self.name),
            ("folderId", &self.folder_id),
            ("datastoreId", &self.datastore_id),
            ("powerState", &self.power_state),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_value_filters_are_empty() {
        assert!(().query().is_empty());
        assert!(NameFilter::default().query().is_empty());
        assert!(VirtualMachineFilter::default().query().is_empty());
    }

    #[test]
    fn vm_filter_only_sends_set_fields() {
        let filter = VirtualMachineFilter {
            name: Some("web-1".into()),
            power_state: Some("on".into()),
            ..Default::default()
        };
        assert_eq!(
            filter.query(),
            vec![
                ("name".to_string(), "web-1".to_string()),
                ("powerState".to_string(), "on".to_string()),
            ]
        );
    }

    #[test]
    fn item_path_appends_id() {
        assert_eq!(ResourceKind::FOLDER.item_path("f-1"), "/vm/v1/folders/f-1");
        assert_eq!(ResourceKind::BACKUP_POLICY.name, "backup policy");
    }
}
