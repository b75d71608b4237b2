//! Snapshot list wrapper: public flags, handles and the bulk XML form.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::def::SnapshotDef;
use super::flags::SnapshotListFlags;
use crate::error::{MomentError, Result};
use crate::moment::{DeleteOutcome, DeletePolicy, MomentId, MomentObj, MomentObjList};
use crate::types::{DomainRef, SnapshotHandle};

/// Root element of the aggregate snapshot document.
const SNAPSHOTS_ROOT: &str = "snapshots";

/// Aggregate `<snapshots current='...'>` document.
#[derive(Debug, Deserialize)]
struct SnapshotsDoc {
    #[serde(rename = "@current", default)]
    current: Option<String>,
    #[serde(rename = "domainsnapshot", default)]
    snapshots: Vec<SnapshotDef>,
}

/// The snapshot forest of one domain.
#[derive(Debug, Clone, Default)]
pub struct SnapshotObjList {
    base: MomentObjList<SnapshotDef>,
}

impl From<MomentObjList<SnapshotDef>> for SnapshotObjList {
    fn from(base: MomentObjList<SnapshotDef>) -> Self {
        Self { base }
    }
}

impl SnapshotObjList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying generic tree.
    pub fn base(&self) -> &MomentObjList<SnapshotDef> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut MomentObjList<SnapshotDef> {
        &mut self.base
    }

    /// Validate and take ownership of `def`.
    pub fn assign_def(&mut self, def: SnapshotDef) -> Result<MomentId> {
        def.validate()?;
        self.base.assign_def(def)
    }

    pub fn find_by_name(&self, name: &str) -> Option<MomentId> {
        self.base.find_by_name(name)
    }

    pub fn get(&self, id: MomentId) -> Option<&MomentObj<SnapshotDef>> {
        self.base.get(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&MomentObj<SnapshotDef>> {
        self.base.get_by_name(name)
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn current(&self) -> Option<MomentId> {
        self.base.current()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.base.current_name()
    }

    pub fn is_current_name(&self, name: &str) -> bool {
        self.base.is_current_name(name)
    }

    pub fn set_current(&mut self, id: Option<MomentId>) {
        self.base.set_current(id)
    }

    pub fn remove(&mut self, id: MomentId) -> bool {
        self.base.remove(id)
    }

    pub fn remove_all(&mut self) {
        self.base.remove_all()
    }

    pub fn update_relations(&mut self) -> Result<()> {
        self.base.update_relations()
    }

    pub fn link_parent(&mut self, id: MomentId) {
        self.base.link_parent(id)
    }

    pub fn check_cycles(&self, def: &SnapshotDef, domain: &str) -> Result<()> {
        self.base.check_cycles(def, domain)
    }

    pub fn redefine(&mut self, id: MomentId, def: SnapshotDef) -> Result<SnapshotDef> {
        def.validate()?;
        self.base.redefine(id, def)
    }

    pub fn delete(&mut self, id: MomentId, policy: DeletePolicy) -> Result<DeleteOutcome> {
        self.base.delete(id, policy)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Names of the snapshots selected by the public flag bits.
    pub fn get_names(&self, from: Option<MomentId>, flags: u32) -> Result<Vec<String>> {
        let flags = SnapshotListFlags::normalize(flags)?;
        let filter = flags.filter();
        self.base
            .get_names(from, flags.to_moment_flags(), |obj| filter.matches(obj.def()))
    }

    /// Number of snapshots [`SnapshotObjList::get_names`] would return.
    pub fn num(&self, from: Option<MomentId>, flags: u32) -> Result<usize> {
        let flags = SnapshotListFlags::normalize(flags)?;
        let filter = flags.filter();
        Ok(self
            .base
            .num(from, flags.to_moment_flags(), |obj| filter.matches(obj.def())))
    }

    /// Build one handle per listed snapshot.
    ///
    /// Either every handle is built or none is returned: the first factory
    /// error drops the handles built so far and is passed back.
    pub fn list_with<H, F>(&self, from: Option<MomentId>, flags: u32, mut factory: F) -> Result<Vec<H>>
    where
        F: FnMut(&str) -> Result<H>,
    {
        let names = self.get_names(from, flags)?;

        let mut handles = Vec::new();
        handles
            .try_reserve_exact(names.len())
            .map_err(|_| MomentError::AllocationFailed)?;
        for name in &names {
            handles.push(factory(name)?);
        }
        Ok(handles)
    }

    /// Public handles for the listed snapshots of `domain`.
    pub fn list_snapshots(
        &self,
        from: Option<MomentId>,
        domain: &Arc<DomainRef>,
        flags: u32,
    ) -> Result<Vec<SnapshotHandle>> {
        self.list_with(from, flags, |name| SnapshotHandle::new(Arc::clone(domain), name))
    }

    // =========================================================================
    // Aggregate XML
    // =========================================================================

    /// Serialize every snapshot into one `<snapshots>` document.
    pub fn format(&self) -> Result<String> {
        let mut buf = String::new();
        self.format_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the aggregate document to `buf`.
    pub fn format_into(&self, buf: &mut String) -> Result<()> {
        self.format_with(buf, SnapshotDef::to_xml)
    }

    /// Append the aggregate document to `buf`, serializing each entry with
    /// `serialize`. On any failure `buf` is cleared.
    pub fn format_with<F>(&self, buf: &mut String, mut serialize: F) -> Result<()>
    where
        F: FnMut(&SnapshotDef) -> Result<String>,
    {
        buf.push('<');
        buf.push_str(SNAPSHOTS_ROOT);
        if let Some(current) = self.current_name() {
            buf.push_str(" current=\"");
            buf.push_str(&quick_xml::escape::escape(current));
            buf.push('"');
        }
        buf.push_str(">\n");

        let result = self.base.for_each(|_, obj| {
            let xml = serialize(obj.def())?;
            buf.push_str(&xml);
            buf.push('\n');
            Ok(())
        });
        if let Err(err) = result {
            buf.clear();
            return Err(err);
        }

        buf.push_str("</");
        buf.push_str(SNAPSHOTS_ROOT);
        buf.push_str(">\n");
        Ok(())
    }

    /// Load an aggregate document into this (empty) list.
    ///
    /// Every snapshot is assigned, relations are built and the `current`
    /// attribute is restored. Any failure leaves the list empty again.
    /// Returns the current snapshot, if the document names one.
    pub fn parse(&mut self, xml: &str) -> Result<Option<MomentId>> {
        if !self.is_empty() {
            return Err(MomentError::InvalidState(
                "bulk snapshot redefine requires an empty list".to_string(),
            ));
        }

        match self.parse_inner(xml) {
            Ok(current) => {
                debug!(count = self.size(), "Parsed snapshot list");
                Ok(current)
            }
            Err(err) => {
                warn!(error = %err, "Discarding partially parsed snapshot list");
                self.remove_all();
                Err(err)
            }
        }
    }

    fn parse_inner(&mut self, xml: &str) -> Result<Option<MomentId>> {
        check_root(xml, SNAPSHOTS_ROOT)?;
        let doc: SnapshotsDoc = quick_xml::de::from_str(xml)?;

        for def in doc.snapshots {
            self.assign_def(def)?;
        }
        self.update_relations()?;

        let Some(current) = doc.current else { return Ok(None) };
        let id = self.find_by_name(&current).ok_or_else(|| {
            MomentError::InvalidDefinition(format!("no snapshot matching current='{}'", current))
        })?;
        self.set_current(Some(id));
        Ok(Some(id))
    }
}

/// Fail unless the document element of `xml` is `<expected>`.
fn check_root(xml: &str, expected: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                if name.as_ref() == expected.as_bytes() {
                    return Ok(());
                }
                return Err(MomentError::Xml(format!(
                    "unexpected root element <{}>, expecting <{}>",
                    String::from_utf8_lossy(name.as_ref()),
                    expected
                )));
            }
            Ok(Event::Eof) => {
                return Err(MomentError::Xml(format!("missing <{}> element", expected)))
            }
            Ok(_) => {}
            Err(err) => return Err(MomentError::Xml(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::def::{SnapshotLocation, SnapshotState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// ```text
    /// S1 (shutoff) ── S2 (running, external) ── S3 (disk-snapshot)
    /// S4 (paused)
    /// ```
    fn sample() -> SnapshotObjList {
        let mut list = SnapshotObjList::new();
        list.assign_def(SnapshotDef::new("S1").with_state(SnapshotState::Shutoff))
            .unwrap();
        list.assign_def(
            SnapshotDef::new("S2")
                .with_parent("S1")
                .with_state(SnapshotState::Running)
                .with_memory(SnapshotLocation::External, Some("/mem".to_string())),
        )
        .unwrap();
        list.assign_def(
            SnapshotDef::new("S3")
                .with_parent("S2")
                .with_state(SnapshotState::DiskSnapshot),
        )
        .unwrap();
        list.assign_def(SnapshotDef::new("S4").with_state(SnapshotState::Paused))
            .unwrap();
        list.update_relations().unwrap();
        list
    }

    fn flags(f: SnapshotListFlags) -> u32 {
        f.bits()
    }

    #[test]
    fn test_structural_flags() {
        let list = sample();
        assert_eq!(
            list.get_names(None, flags(SnapshotListFlags::ROOTS)).unwrap(),
            vec!["S1", "S4"]
        );
        assert_eq!(
            list.get_names(None, flags(SnapshotListFlags::LEAVES)).unwrap(),
            vec!["S3", "S4"]
        );
        let s1 = list.find_by_name("S1");
        assert_eq!(
            list.get_names(s1, flags(SnapshotListFlags::DESCENDANTS)).unwrap(),
            vec!["S2", "S3"]
        );
    }

    #[test]
    fn test_status_and_location_flags() {
        let list = sample();
        assert_eq!(list.get_names(None, flags(SnapshotListFlags::INACTIVE)).unwrap(), vec!["S1"]);
        assert_eq!(
            list.get_names(None, flags(SnapshotListFlags::ACTIVE)).unwrap(),
            vec!["S2", "S4"]
        );
        assert_eq!(list.get_names(None, flags(SnapshotListFlags::DISK_ONLY)).unwrap(), vec!["S3"]);
        assert_eq!(list.get_names(None, flags(SnapshotListFlags::EXTERNAL)).unwrap(), vec!["S2"]);
        assert_eq!(list.num(None, flags(SnapshotListFlags::INTERNAL)).unwrap(), 3);
        assert_eq!(list.num(None, flags(SnapshotListFlags::FILTERS_STATUS)).unwrap(), 4);
        assert_eq!(
            list.get_names(None, flags(SnapshotListFlags::ACTIVE | SnapshotListFlags::LEAVES))
                .unwrap(),
            vec!["S4"]
        );
    }

    #[test]
    fn test_metadata_flags() {
        let list = sample();
        assert_eq!(list.num(None, flags(SnapshotListFlags::METADATA)).unwrap(), 4);
        assert_eq!(list.num(None, flags(SnapshotListFlags::NO_METADATA)).unwrap(), 0);
    }

    #[test]
    fn test_num_matches_names_for_every_public_flag() {
        let list = sample();
        let s1 = list.find_by_name("S1");
        for bits in 0..=SnapshotListFlags::ALL.bits() {
            for from in [None, s1] {
                let names = list.get_names(from, bits).unwrap();
                assert_eq!(list.num(from, bits).unwrap(), names.len(), "flags {:#x}", bits);
            }
        }
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let list = sample();
        assert!(matches!(
            list.get_names(None, 1 << 12),
            Err(MomentError::InvalidFlags { .. })
        ));
        assert!(list.num(None, 1 << 12).is_err());
    }

    #[test]
    fn test_list_snapshots_builds_handles() {
        let list = sample();
        let domain = Arc::new(DomainRef::new("vm1"));
        let handles = list
            .list_snapshots(None, &domain, flags(SnapshotListFlags::TOPOLOGICAL))
            .unwrap();
        let names: Vec<_> = handles.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["S1", "S2", "S3", "S4"]);
        assert!(handles.iter().all(|h| Arc::ptr_eq(&h.domain, &domain)));
    }

    struct Counted<'a>(&'a AtomicUsize);

    impl Drop for Counted<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_list_with_is_all_or_nothing() {
        let list = sample();
        let created = AtomicUsize::new(0);
        let dropped = AtomicUsize::new(0);

        let result = list.list_with(None, 0, |name| {
            if name == "S3" {
                return Err(MomentError::HandleFailed {
                    name: name.to_string(),
                    reason: "injected".to_string(),
                });
            }
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Counted(&dropped))
        });

        assert!(matches!(result, Err(MomentError::HandleFailed { .. })));
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_format_and_parse() {
        let mut list = sample();
        list.set_current(list.find_by_name("S3"));
        let xml = list.format().unwrap();
        assert!(xml.starts_with("<snapshots current=\"S3\">"));
        assert!(xml.trim_end().ends_with("</snapshots>"));

        let mut copy = SnapshotObjList::new();
        let current = copy.parse(&xml).unwrap();
        assert_eq!(current, copy.find_by_name("S3"));
        assert_eq!(copy.size(), 4);
        assert_eq!(copy.current_name(), Some("S3"));
        assert_eq!(copy.get_names(None, flags(SnapshotListFlags::ROOTS)).unwrap(), vec!["S1", "S4"]);
        assert_eq!(copy.get_by_name("S2").unwrap().nchildren(), 1);
    }

    #[test]
    fn test_format_escapes_current() {
        let mut list = SnapshotObjList::new();
        let id = list.assign_def(SnapshotDef::new("a&b")).unwrap();
        list.update_relations().unwrap();
        list.set_current(Some(id));
        let xml = list.format().unwrap();
        assert!(xml.starts_with("<snapshots current=\"a&amp;b\">"));
    }

    #[test]
    fn test_format_failure_clears_buffer() {
        let list = sample();
        let mut buf = String::from("stale");
        let result = list.format_with(&mut buf, |def| {
            if def.name == "S2" {
                Err(MomentError::Xml("boom".to_string()))
            } else {
                def.to_xml()
            }
        });
        assert!(result.is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_failure_leaves_list_empty() {
        let xml = r#"<snapshots>
  <domainsnapshot><name>A</name></domainsnapshot>
  <domainsnapshot><name>B</name><parent><name>ghost</name></parent></domainsnapshot>
</snapshots>"#;
        let mut list = SnapshotObjList::new();
        let err = list.parse(xml).unwrap_err();
        assert!(matches!(err, MomentError::MissingParent { .. }));
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_current_and_root() {
        let mut list = SnapshotObjList::new();
        let xml = "<snapshots current=\"nope\"><domainsnapshot><name>A</name></domainsnapshot></snapshots>";
        assert!(list.parse(xml).is_err());
        assert!(list.is_empty());

        assert!(list.parse("<checkpoints/>").is_err());
        assert!(list.parse("<snapshots/>").unwrap().is_none());
    }

    #[test]
    fn test_parse_requires_empty_list() {
        let mut list = sample();
        let err = list.parse("<snapshots/>").unwrap_err();
        assert!(matches!(err, MomentError::InvalidState(_)));
        assert_eq!(list.size(), 4);
    }
}
