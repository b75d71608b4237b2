//! In-memory snapshot driver for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::MomentConfig;
use crate::error::{MomentError, Result};
use crate::moment::{DeleteOutcome, DeletePolicy, MomentDef, MomentId};
use crate::snapshot::{SnapshotDef, SnapshotObjList, SnapshotState};
use crate::store::MetadataStore;
use crate::traits::{SnapshotCreateFlags, SnapshotDeleteFlags, SnapshotDriver};
use crate::types::{DomainRef, SnapshotHandle};

/// Snapshot driver that keeps every domain in memory.
///
/// Snapshots are tracked in a [`SnapshotObjList`] per domain; the map lock
/// doubles as the per-domain lock serializing tree mutation. When a
/// [`MetadataStore`] is configured every change is written through to it
/// and defining a domain reloads what was persisted.
pub struct MockDriver {
    domains: RwLock<HashMap<String, MockDomain>>,
    store: Option<MetadataStore>,
    default_policy: DeletePolicy,
}

struct MockDomain {
    domain: Arc<DomainRef>,
    state: SnapshotState,
    snapshots: SnapshotObjList,
}

impl MockDomain {
    fn snapshot_id(&self, name: &str) -> Result<MomentId> {
        self.snapshots
            .find_by_name(name)
            .ok_or_else(|| MomentError::NotFound(name.to_string()))
    }

    fn handle(&self, name: &str) -> Result<SnapshotHandle> {
        SnapshotHandle::new(Arc::clone(&self.domain), name)
    }
}

impl MockDriver {
    /// Create a driver without persistence.
    pub fn new() -> Self {
        info!("Creating mock snapshot driver");
        Self {
            domains: RwLock::new(HashMap::new()),
            store: None,
            default_policy: DeletePolicy::default(),
        }
    }

    /// Create a driver persisting to the configured snapshot directory,
    /// or only in memory when none is set.
    pub fn from_config(config: &MomentConfig) -> Self {
        let mut driver = Self::new().with_default_policy(config.delete.default_policy);
        driver.store = MetadataStore::snapshots(config);
        driver
    }

    pub fn with_store(mut self, store: MetadataStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_default_policy(mut self, policy: DeletePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Change the state new snapshots of `domain` record.
    pub async fn set_domain_state(&self, domain: &str, state: SnapshotState) -> Result<()> {
        let mut domains = self.domains.write().await;
        let dom = domains
            .get_mut(domain)
            .ok_or_else(|| MomentError::DomainNotFound(domain.to_string()))?;
        dom.state = state;
        Ok(())
    }

    /// Current state of `domain`.
    pub async fn domain_state(&self, domain: &str) -> Result<SnapshotState> {
        let domains = self.domains.read().await;
        domains
            .get(domain)
            .map(|dom| dom.state)
            .ok_or_else(|| MomentError::DomainNotFound(domain.to_string()))
    }

    /// Write `update` to the store, if any.
    ///
    /// On failure the files touched so far are put back the way
    /// `committed` (the unchanged in-memory forest) describes them.
    async fn persist(
        &self,
        domain: &str,
        committed: &SnapshotObjList,
        update: StoreUpdate,
    ) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        if let Err(e) = update.write(store, domain).await {
            warn!(error = %e, "Failed to persist snapshot metadata, restoring previous files");
            update.restore(store, domain, committed).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Store writes matching one staged change of a domain's forest.
#[derive(Debug, Default)]
struct StoreUpdate {
    save: Vec<SnapshotDef>,
    remove: Vec<String>,
    /// New current marker, `None` to leave it alone.
    current: Option<Option<String>>,
}

impl StoreUpdate {
    async fn write(&self, store: &MetadataStore, domain: &str) -> Result<()> {
        for def in &self.save {
            store.save(domain, def).await?;
        }
        if let Some(current) = &self.current {
            store.set_current(domain, current.as_deref()).await?;
        }
        for name in &self.remove {
            store.remove(domain, name).await?;
        }
        Ok(())
    }

    async fn restore(&self, store: &MetadataStore, domain: &str, committed: &SnapshotObjList) {
        let names: Vec<&str> = self
            .save
            .iter()
            .map(|def| def.name.as_str())
            .chain(self.remove.iter().map(String::as_str))
            .collect();

        for name in names {
            let result = match committed.get_by_name(name) {
                Some(obj) => store.save(domain, obj.def()).await,
                None => store.remove(domain, name).await,
            };
            if let Err(e) = result {
                warn!(snapshot = %name, error = %e, "Failed to restore snapshot metadata");
            }
        }
        if self.current.is_some() {
            if let Err(e) = store.set_current(domain, committed.current_name()).await {
                warn!(error = %e, "Failed to restore current snapshot marker");
            }
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn domain_not_found(domain: &str) -> MomentError {
    MomentError::DomainNotFound(domain.to_string())
}

#[async_trait]
impl SnapshotDriver for MockDriver {
    #[instrument(skip(self, domain), fields(domain = %domain.name))]
    async fn define_domain(&self, domain: DomainRef) -> Result<Arc<DomainRef>> {
        let mut domains = self.domains.write().await;
        if domains.contains_key(&domain.name) {
            return Err(MomentError::InvalidState(format!(
                "domain '{}' is already defined",
                domain.name
            )));
        }

        let snapshots = match &self.store {
            Some(store) => SnapshotObjList::from(store.load_domain::<SnapshotDef>(&domain.name).await?),
            None => SnapshotObjList::new(),
        };

        let domain = Arc::new(domain);
        info!(snapshots = snapshots.size(), "Domain defined");
        domains.insert(
            domain.name.clone(),
            MockDomain {
                domain: Arc::clone(&domain),
                state: SnapshotState::Running,
                snapshots,
            },
        );
        Ok(domain)
    }

    #[instrument(skip(self))]
    async fn undefine_domain(&self, domain: &str) -> Result<()> {
        let mut domains = self.domains.write().await;
        if !domains.contains_key(domain) {
            return Err(domain_not_found(domain));
        }

        if let Some(store) = &self.store {
            store.remove_domain(domain).await?;
        }
        if let Some(mut dom) = domains.remove(domain) {
            dom.snapshots.remove_all();
        }
        info!("Domain undefined");
        Ok(())
    }

    #[instrument(skip(self, xml))]
    async fn create_snapshot(&self, domain: &str, xml: &str, flags: u32) -> Result<SnapshotHandle> {
        let flags = SnapshotCreateFlags::parse(flags)?;
        let mut def = SnapshotDef::from_xml(xml)?;

        let mut domains = self.domains.write().await;
        let dom = domains.get_mut(domain).ok_or_else(|| domain_not_found(domain))?;

        if flags.contains(SnapshotCreateFlags::REDEFINE) {
            def.validate()?;
            dom.snapshots.check_cycles(&def, domain)?;

            let mut staged = dom.snapshots.clone();
            let id = match staged.find_by_name(&def.name) {
                Some(id) => {
                    staged.redefine(id, def.clone())?;
                    id
                }
                None => {
                    let id = staged.assign_def(def.clone())?;
                    staged.link_parent(id);
                    id
                }
            };
            if flags.contains(SnapshotCreateFlags::CURRENT) {
                staged.set_current(Some(id));
            }

            let handle = dom.handle(&def.name)?;
            let update = StoreUpdate {
                current: Some(staged.current_name().map(str::to_string)),
                save: vec![def],
                ..Default::default()
            };
            self.persist(domain, &dom.snapshots, update).await?;
            dom.snapshots = staged;
            info!(snapshot = %handle.name, "Snapshot redefined");
            return Ok(handle);
        }

        def.post_parse();
        def.validate()?;
        if dom.snapshots.find_by_name(&def.name).is_some() {
            return Err(MomentError::DuplicateName(def.name));
        }
        def.state = dom.state;
        def.set_parent_name(dom.snapshots.current_name().map(str::to_string));

        let handle = dom.handle(&def.name)?;
        if flags.contains(SnapshotCreateFlags::NO_METADATA) {
            info!(snapshot = %def.name, "Snapshot created without metadata");
            return Ok(handle);
        }

        let mut staged = dom.snapshots.clone();
        let id = staged.assign_def(def.clone())?;
        staged.link_parent(id);
        staged.set_current(Some(id));

        let parent = def.parent_name().map(str::to_string);
        let update = StoreUpdate {
            current: Some(Some(def.name.clone())),
            save: vec![def],
            ..Default::default()
        };
        self.persist(domain, &dom.snapshots, update).await?;
        dom.snapshots = staged;
        info!(snapshot = %handle.name, parent = ?parent, "Snapshot created");
        Ok(handle)
    }

    async fn lookup(&self, domain: &str, name: &str) -> Result<SnapshotHandle> {
        let domains = self.domains.read().await;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        dom.snapshot_id(name)?;
        dom.handle(name)
    }

    async fn current(&self, domain: &str) -> Result<Option<SnapshotHandle>> {
        let domains = self.domains.read().await;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        dom.snapshots
            .current_name()
            .map(|name| dom.handle(name))
            .transpose()
    }

    async fn parent(&self, snapshot: &SnapshotHandle) -> Result<Option<SnapshotHandle>> {
        let domains = self.domains.read().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;

        let id = dom.snapshot_id(&snapshot.name)?;
        let parent = dom
            .snapshots
            .get(id)
            .and_then(|obj| obj.parent())
            .and_then(|parent| dom.snapshots.base().name_of(parent));
        parent.map(|name| dom.handle(name)).transpose()
    }

    async fn list(&self, domain: &str, flags: u32) -> Result<Vec<SnapshotHandle>> {
        let domains = self.domains.read().await;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        dom.snapshots.list_snapshots(None, &dom.domain, flags)
    }

    async fn list_children(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<Vec<SnapshotHandle>> {
        let domains = self.domains.read().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        let id = dom.snapshot_id(&snapshot.name)?;
        dom.snapshots.list_snapshots(Some(id), &dom.domain, flags)
    }

    async fn num(&self, domain: &str, flags: u32) -> Result<usize> {
        let domains = self.domains.read().await;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        dom.snapshots.num(None, flags)
    }

    async fn num_children(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<usize> {
        let domains = self.domains.read().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        let id = dom.snapshot_id(&snapshot.name)?;
        dom.snapshots.num(Some(id), flags)
    }

    #[instrument(skip(self, snapshot), fields(domain = %snapshot.domain.name, snapshot = %snapshot.name))]
    async fn revert(&self, snapshot: &SnapshotHandle) -> Result<()> {
        let mut domains = self.domains.write().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get_mut(domain).ok_or_else(|| domain_not_found(domain))?;

        let id = dom.snapshot_id(&snapshot.name)?;
        let state = dom
            .snapshots
            .get(id)
            .map(|obj| obj.def().state)
            .ok_or_else(|| MomentError::NotFound(snapshot.name.clone()))?;
        if state == SnapshotState::DiskSnapshot {
            return Err(MomentError::InvalidState(format!(
                "cannot revert to disk-only snapshot '{}'",
                snapshot.name
            )));
        }

        let update = StoreUpdate {
            current: Some(Some(snapshot.name.clone())),
            ..Default::default()
        };
        self.persist(domain, &dom.snapshots, update).await?;
        dom.state = state;
        dom.snapshots.set_current(Some(id));
        info!(state = %state, "Reverted to snapshot");
        Ok(())
    }

    #[instrument(skip(self, snapshot), fields(domain = %snapshot.domain.name, snapshot = %snapshot.name))]
    async fn delete(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<DeleteOutcome> {
        let policy = SnapshotDeleteFlags::policy(flags, self.default_policy)?;

        let mut domains = self.domains.write().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get_mut(domain).ok_or_else(|| domain_not_found(domain))?;

        let id = dom.snapshot_id(&snapshot.name)?;
        let mut staged = dom.snapshots.clone();
        let outcome = staged.delete(id, policy)?;

        let update = StoreUpdate {
            save: outcome
                .reparented
                .iter()
                .filter_map(|name| staged.get_by_name(name))
                .map(|obj| obj.def().clone())
                .collect(),
            remove: outcome.removed.clone(),
            current: outcome.current_changed.then(|| outcome.current.clone()),
        };
        self.persist(domain, &dom.snapshots, update).await?;
        dom.snapshots = staged;

        info!(
            policy = ?policy,
            removed = outcome.removed.len(),
            reparented = outcome.reparented.len(),
            "Snapshot deleted"
        );
        Ok(outcome)
    }

    async fn xml(&self, snapshot: &SnapshotHandle) -> Result<String> {
        let domains = self.domains.read().await;
        let domain = &snapshot.domain.name;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        let id = dom.snapshot_id(&snapshot.name)?;
        match dom.snapshots.get(id) {
            Some(obj) => obj.def().to_xml(),
            None => Err(MomentError::NotFound(snapshot.name.clone())),
        }
    }

    async fn export(&self, domain: &str) -> Result<String> {
        let domains = self.domains.read().await;
        let dom = domains.get(domain).ok_or_else(|| domain_not_found(domain))?;
        dom.snapshots.format()
    }

    #[instrument(skip(self, xml))]
    async fn import(&self, domain: &str, xml: &str) -> Result<()> {
        let mut domains = self.domains.write().await;
        let dom = domains.get_mut(domain).ok_or_else(|| domain_not_found(domain))?;
        let mut staged = dom.snapshots.clone();
        staged.parse(xml)?;

        let update = StoreUpdate {
            save: staged.base().iter().map(|(_, obj)| obj.def().clone()).collect(),
            current: Some(staged.current_name().map(str::to_string)),
            ..Default::default()
        };
        self.persist(domain, &dom.snapshots, update).await?;
        dom.snapshots = staged;
        debug!(count = dom.snapshots.size(), "Snapshots imported");
        Ok(())
    }
}
