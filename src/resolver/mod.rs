//! Dependency resolution
//!
//! Turns a set of targets plus an environment into an ordered,
//! consistent install plan. Targets expand into dep spec trees;
//! traversal honors USE conditionals and any-of groups; each package
//! spec selects the best candidate per slot; dependency categories
//! produce ordering arrows; Tarjan SCC breaks runtime cycles; the
//! result is a stable topological order with per-entry classification.

pub mod entry;
pub mod order;

pub use entry::{ChangeType, DepListEntry, DepListEntryKind};
pub use order::{Arrow, ArrowKind};

use crate::dep_spec::{
    BlockDepSpec, DepLabelRole, DepSpec, DepTag, PackageDepSpec, UseRequirementKind,
};
use crate::environment::Environment;
use crate::error::{Error, Result, ResultExt};
use crate::mask::MaskReasons;
use crate::name::{QualifiedPackageName, SetName, SlotName, UseFlagName, UseFlagState};
use crate::package_id::PackageId;
use crate::query::{match_package_from, use_requirement_met, use_requirements_met};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Which slots of a package a target covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotTargets {
    /// The best slot only
    #[default]
    Best,
    /// Every slot with a matching candidate
    All,
    /// Only slots that already have an installed version
    Installed,
}

/// When to reinstall something already installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReinstallPolicy {
    #[default]
    Never,
    IfUseChanged,
    Always,
}

/// Whether a plan may replace an installed version with an older one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DowngradePolicy {
    #[default]
    AsNeeded,
    Error,
}

/// What to do with suggested dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuggestedPolicy {
    /// Record them as suggestions without scheduling
    #[default]
    Show,
    /// Treat them as run-time dependencies
    Install,
    /// Drop them entirely
    Discard,
}

/// Resolution options
#[derive(Debug, Clone, Copy, Default)]
pub struct DepListOptions {
    pub target_slots: SlotTargets,
    pub reinstall: ReinstallPolicy,
    pub downgrade: DowngradePolicy,
    pub suggested: SuggestedPolicy,
    /// Enable USE flags demanded by `[flag]` requirements when the
    /// candidate's IUSE admits them, instead of rejecting the
    /// candidate. Off by default: reject, do not auto-enable.
    pub auto_enable_use: bool,
    /// Record masked targets as plan entries instead of failing
    pub continue_on_masked: bool,
}

/// How a dependency edge was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepRole {
    Target,
    Build,
    Run,
    Post,
    Suggest,
}

impl DepRole {
    fn from_label(role: DepLabelRole) -> DepRole {
        match role {
            DepLabelRole::Build => DepRole::Build,
            DepLabelRole::Run => DepRole::Run,
            DepLabelRole::Post => DepRole::Post,
            DepLabelRole::Suggestion => DepRole::Suggest,
        }
    }
}

/// Traversal state handed down the spec tree
#[derive(Debug, Clone)]
struct TraversalCtx {
    parent_entry: Option<usize>,
    parent_id: Option<Arc<PackageId>>,
    /// USE overrides chosen for the parent; conditionals under it see
    /// these before the environment
    parent_overrides: Vec<(UseFlagName, bool)>,
    role: DepRole,
    tag: DepTag,
}

#[derive(Debug)]
struct PendingAnyOf {
    children: Vec<DepSpec>,
    ctx: TraversalCtx,
}

/// The finished plan
#[derive(Debug)]
pub struct ResolvedDepList {
    entries: Vec<DepListEntry>,
    arrows: Vec<Arrow>,
}

impl ResolvedDepList {
    /// Entries in merge order.
    pub fn entries(&self) -> &[DepListEntry] {
        &self.entries
    }

    /// Ordering arrows, with indices into [`entries`](Self::entries);
    /// downgraded arrows were waived to break cycles.
    pub fn arrows(&self) -> &[Arrow] {
        &self.arrows
    }

    pub fn iter(&self) -> impl Iterator<Item = &DepListEntry> {
        self.entries.iter()
    }
}

/// Install plan builder
pub struct DepList<'e> {
    env: &'e Environment,
    options: DepListOptions,
    entries: Vec<DepListEntry>,
    arrows: Vec<Arrow>,
    /// `(name, slot)` to entry index for everything already planned
    merged: HashMap<(QualifiedPackageName, SlotName), usize>,
    pending_any_of: Vec<PendingAnyOf>,
    set_stack: Vec<SetName>,
}

impl<'e> DepList<'e> {
    pub fn new(env: &'e Environment, options: DepListOptions) -> Self {
        Self {
            env,
            options,
            entries: Vec::new(),
            arrows: Vec::new(),
            merged: HashMap::new(),
            pending_any_of: Vec::new(),
            set_stack: Vec::new(),
        }
    }

    /// Add one user target spec.
    pub fn add_target(&mut self, spec: &PackageDepSpec) -> Result<()> {
        info!(target = %spec, "adding resolution target");
        let ctx = TraversalCtx {
            parent_entry: None,
            parent_id: None,
            parent_overrides: Vec::new(),
            role: DepRole::Target,
            tag: DepTag::Target,
        };
        let result = self.add_package(spec, &ctx);
        match result {
            Err(err) if self.options.continue_on_masked => match err.root() {
                Error::AllMasked { .. } | Error::NoSuchPackage(_) => {
                    self.record_masked_target(spec, &ctx, err)
                }
                _ => Err(err),
            },
            other => other,
        }
    }

    /// Add a named set as a target.
    pub fn add_set(&mut self, name: &SetName) -> Result<()> {
        info!(set = %name, "adding resolution target set");
        let tree = self.env.set(name)?;
        let ctx = TraversalCtx {
            parent_entry: None,
            parent_id: None,
            parent_overrides: Vec::new(),
            role: DepRole::Target,
            tag: DepTag::Set(name.clone()),
        };
        self.set_stack.push(name.clone());
        let result = self.add_spec_tree(&tree, &ctx);
        self.set_stack.pop();
        result
    }

    /// Resolve outstanding alternatives, order everything and hand the
    /// plan over.
    pub fn finish(mut self) -> Result<ResolvedDepList> {
        let pending = std::mem::take(&mut self.pending_any_of);
        for p in pending {
            self.retry_any_of(p)?;
        }

        let entries = std::mem::take(&mut self.entries);
        let mut arrows = std::mem::take(&mut self.arrows);
        let order = order::schedule(entries.len(), &mut arrows, |i| {
            entries[i]
                .package_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| entries[i].spec.to_string())
        })?;

        let mut position = vec![0usize; entries.len()];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = pos;
        }
        let mut ordered: Vec<(usize, DepListEntry)> = entries.into_iter().enumerate().collect();
        ordered.sort_by_key(|(idx, _)| position[*idx]);
        let entries: Vec<DepListEntry> = ordered.into_iter().map(|(_, e)| e).collect();
        for arrow in &mut arrows {
            arrow.from = position[arrow.from];
            arrow.to = position[arrow.to];
        }

        info!(entries = entries.len(), "resolution finished");
        Ok(ResolvedDepList { entries, arrows })
    }

    fn add_spec_tree(&mut self, spec: &DepSpec, ctx: &TraversalCtx) -> Result<()> {
        match spec {
            DepSpec::AllOf(children) => {
                let mut role = ctx.role;
                for child in children {
                    if let DepSpec::Labels(labels) = child {
                        if let Some(label) = labels.last() {
                            role = DepRole::from_label(label.role);
                        }
                        continue;
                    }
                    let child_ctx = TraversalCtx {
                        role,
                        ..ctx.clone()
                    };
                    self.add_spec_tree(child, &child_ctx)?;
                }
                Ok(())
            }
            DepSpec::AnyOf(children) => self.add_any_of(children, ctx),
            DepSpec::Conditional(c) => {
                let active = (self.flag_state(ctx, &c.flag) == UseFlagState::Enabled) != c.inverse;
                trace!(flag = %c.flag, inverse = c.inverse, active, "conditional group");
                if active {
                    for child in &c.children {
                        self.add_spec_tree(child, ctx)?;
                    }
                }
                Ok(())
            }
            DepSpec::Package(p) => self.add_package(p, ctx),
            DepSpec::Block(b) => self.add_block(b, ctx),
            DepSpec::NamedSet(name) => {
                if self.set_stack.contains(name) {
                    return Err(Error::Configuration(format!(
                        "set {} refers to itself",
                        name
                    )));
                }
                let tree = self.env.set(name)?;
                let ctx = TraversalCtx {
                    tag: DepTag::Set(name.clone()),
                    ..ctx.clone()
                };
                self.set_stack.push(name.clone());
                let result = self.add_spec_tree(&tree, &ctx);
                self.set_stack.pop();
                result
            }
            // non-package leaves carry nothing in a dependency walk
            DepSpec::PlainText(_)
            | DepSpec::License(_)
            | DepSpec::SimpleUri(_)
            | DepSpec::FetchableUri(_)
            | DepSpec::Labels(_) => Ok(()),
        }
    }

    /// The flag state as the current parent sees it, with resolver
    /// overrides applied first.
    fn flag_state(&self, ctx: &TraversalCtx, flag: &UseFlagName) -> UseFlagState {
        for (f, enabled) in &ctx.parent_overrides {
            if f == flag {
                return if *enabled {
                    UseFlagState::Enabled
                } else {
                    UseFlagState::Disabled
                };
            }
        }
        self.env.query_use(flag, ctx.parent_id.as_deref())
    }

    fn add_any_of(&mut self, children: &[DepSpec], ctx: &TraversalCtx) -> Result<()> {
        // a child already satisfied by the plan or the installed set
        // wins outright
        for child in children {
            if self.any_of_child_satisfied(child, ctx)? {
                trace!("any-of group already satisfied");
                return self.add_spec_tree(child, ctx);
            }
        }
        // otherwise take the first child that resolves
        for child in children {
            match self.try_add_alternative(child, ctx) {
                Ok(()) => return Ok(()),
                Err(err) => match err.root() {
                    Error::AllMasked { .. } | Error::NoSuchPackage(_) => continue,
                    _ => return Err(err),
                },
            }
        }
        debug!("any-of group unresolved, keeping as pending alternative");
        self.pending_any_of.push(PendingAnyOf {
            children: children.to_vec(),
            ctx: ctx.clone(),
        });
        Ok(())
    }

    /// Attempt one alternative, rolling the plan back if it fails.
    fn try_add_alternative(&mut self, child: &DepSpec, ctx: &TraversalCtx) -> Result<()> {
        let entries_len = self.entries.len();
        let arrows_len = self.arrows.len();
        let merged_snapshot = self.merged.clone();
        let pending_len = self.pending_any_of.len();

        match self.add_spec_tree(child, ctx) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.entries.truncate(entries_len);
                self.arrows.truncate(arrows_len);
                self.merged = merged_snapshot;
                self.pending_any_of.truncate(pending_len);
                Err(err)
            }
        }
    }

    fn retry_any_of(&mut self, pending: PendingAnyOf) -> Result<()> {
        for child in &pending.children {
            if self.any_of_child_satisfied(child, &pending.ctx)? {
                return self.add_spec_tree(child, &pending.ctx);
            }
        }
        let mut failures = Vec::new();
        for child in &pending.children {
            match self.try_add_alternative(child, &pending.ctx) {
                Ok(()) => return Ok(()),
                Err(err) => match err.root() {
                    Error::AllMasked { candidates, .. } => {
                        failures.extend(candidates.iter().cloned());
                    }
                    Error::NoSuchPackage(name) => {
                        failures.push(format!("{} (no such package)", name));
                    }
                    _ => return Err(err),
                },
            }
        }
        Err(Error::AllMasked {
            spec: DepSpec::AnyOf(pending.children.clone()).to_string(),
            candidates: failures,
        })
    }

    /// Is this alternative satisfied without adding anything new?
    fn any_of_child_satisfied(&self, child: &DepSpec, ctx: &TraversalCtx) -> Result<bool> {
        match child {
            DepSpec::Package(spec) => {
                for entry in &self.entries {
                    if let Some(id) = &entry.package_id {
                        if entry.kind != DepListEntryKind::Block
                            && entry.kind != DepListEntryKind::Masked
                            && match_package_from(self.env, spec, id, ctx.parent_id.as_deref())?
                        {
                            return Ok(true);
                        }
                    }
                }
                Ok(!self
                    .installed_matches(spec, ctx.parent_id.as_deref())?
                    .is_empty())
            }
            DepSpec::AllOf(children) => {
                for c in children {
                    if !self.any_of_child_satisfied(c, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            DepSpec::Conditional(c) => {
                let active = (self.flag_state(ctx, &c.flag) == UseFlagState::Enabled) != c.inverse;
                if !active {
                    return Ok(true);
                }
                for ch in &c.children {
                    if !self.any_of_child_satisfied(ch, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Ids matching `spec` in installed repositories.
    fn installed_matches(
        &self,
        spec: &PackageDepSpec,
        caller: Option<&PackageId>,
    ) -> Result<Vec<Arc<PackageId>>> {
        let mut out = Vec::new();
        for repo in self.env.database().repositories() {
            if !repo.capabilities().installed {
                continue;
            }
            for id in self.candidate_ids_in(repo.as_ref(), spec) {
                if match_package_from(self.env, spec, &id, caller)? {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    /// Candidate ids of one repository for a spec's name part.
    fn candidate_ids_in(
        &self,
        repo: &dyn crate::repository::Repository,
        spec: &PackageDepSpec,
    ) -> Vec<Arc<PackageId>> {
        match &spec.package {
            Some(qpn) => repo.package_ids(qpn),
            None => {
                let mut out = Vec::new();
                for category in repo.category_names() {
                    for qpn in repo.package_names(&category) {
                        if spec.name_matches(&qpn) {
                            out.extend(repo.package_ids(&qpn));
                        }
                    }
                }
                out
            }
        }
    }

    fn add_package(&mut self, spec: &PackageDepSpec, ctx: &TraversalCtx) -> Result<()> {
        // an existing entry that satisfies the spec absorbs it
        let qpn_entries: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.package_id
                    .as_ref()
                    .is_some_and(|id| spec.name_matches(id.name()))
                    && !matches!(
                        e.kind,
                        DepListEntryKind::Block
                            | DepListEntryKind::Masked
                            | DepListEntryKind::Suggested
                    )
            })
            .map(|(i, _)| i)
            .collect();
        for idx in &qpn_entries {
            let id = self.entries[*idx].package_id.clone().expect("filtered above");
            if match_package_from(self.env, spec, &id, ctx.parent_id.as_deref())? {
                trace!(entry = %id, "spec satisfied by existing entry");
                self.entries[*idx].tags.push(ctx.tag.clone());
                self.add_arrow(*idx, ctx);
                return Ok(());
            }
        }

        // virtuals resolve through their provider mapping
        if let Some(provider) = self.lookup_virtual(spec) {
            return self.add_virtual(spec, &provider, ctx);
        }

        // wildcard specs expand to one resolution per covered name
        if spec.package.is_none() {
            let mut names: Vec<QualifiedPackageName> = Vec::new();
            for repo in self.env.database().repositories() {
                if !repo.capabilities().installable {
                    continue;
                }
                for category in repo.category_names() {
                    for qpn in repo.package_names(&category) {
                        if spec.name_matches(&qpn) && !names.contains(&qpn) {
                            names.push(qpn);
                        }
                    }
                }
            }
            if names.is_empty() {
                return Err(Error::NoSuchPackage(spec.to_string()));
            }
            names.sort();
            for qpn in names {
                let mut narrowed = spec.clone();
                narrowed.package = Some(qpn);
                narrowed.category = None;
                narrowed.package_part = None;
                self.add_package(&narrowed, ctx)?;
            }
            return Ok(());
        }

        match self.select_candidates(spec, ctx) {
            Ok(selections) => {
                for selection in selections {
                    self.record_selection(spec, ctx, selection, &qpn_entries)?;
                }
                Ok(())
            }
            // the tree may have moved on from something still installed;
            // an installed match keeps satisfying the spec
            Err(err)
                if matches!(
                    err.root(),
                    Error::NoSuchPackage(_) | Error::AllMasked { .. }
                ) =>
            {
                let installed = self.installed_matches(spec, ctx.parent_id.as_deref())?;
                let Some(id) = installed.into_iter().next_back() else {
                    return Err(err);
                };
                debug!(id = %id, "spec satisfied by installed package only");
                let slot = id.slot().cloned().unwrap_or_else(|| {
                    SlotName::new("0").expect("0 is a valid slot")
                });
                let idx = self.push_entry(DepListEntry {
                    kind: DepListEntryKind::AlreadyInstalled,
                    package_id: Some(id.clone()),
                    spec: spec.clone(),
                    destination: None,
                    tags: vec![ctx.tag.clone()],
                    change: None,
                    mask_reasons: MaskReasons::none(),
                    use_overrides: Vec::new(),
                });
                self.merged.insert((id.name().clone(), slot), idx);
                self.add_arrow(idx, ctx);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn lookup_virtual(&self, spec: &PackageDepSpec) -> Option<PackageDepSpec> {
        let qpn = spec.package.as_ref()?;
        for repo in self.env.database().repositories() {
            if !repo.package_ids(qpn).is_empty() {
                // a real package shadows a virtual of the same name
                return None;
            }
        }
        for repo in self.env.database().repositories() {
            if let Some(provider) = repo.virtuals().get(qpn) {
                return Some(provider.clone());
            }
        }
        None
    }

    fn add_virtual(
        &mut self,
        spec: &PackageDepSpec,
        provider: &PackageDepSpec,
        ctx: &TraversalCtx,
    ) -> Result<()> {
        let qpn = spec.package.clone().expect("virtuals are name mappings");
        debug!(name = %qpn, provider = %provider, "resolving virtual");

        let installed = self.installed_matches(provider, ctx.parent_id.as_deref())?;
        if let Some(provider_id) = installed.into_iter().next_back() {
            // satisfied by an installed provider
            let idx = self.push_entry(DepListEntry {
                kind: DepListEntryKind::Provided,
                package_id: Some(provider_id),
                spec: spec.clone(),
                destination: None,
                tags: vec![ctx.tag.clone()],
                change: None,
                mask_reasons: MaskReasons::none(),
                use_overrides: Vec::new(),
            });
            self.add_arrow(idx, ctx);
            return Ok(());
        }

        let idx = self.push_entry(DepListEntry {
            kind: DepListEntryKind::Virtual,
            package_id: None,
            spec: spec.clone(),
            destination: None,
            tags: vec![ctx.tag.clone()],
            change: None,
            mask_reasons: MaskReasons::none(),
            use_overrides: Vec::new(),
        });
        self.add_arrow(idx, ctx);
        self.add_package(provider, ctx)
    }

    fn select_candidates(
        &self,
        spec: &PackageDepSpec,
        ctx: &TraversalCtx,
    ) -> Result<Vec<Selection>> {
        let caller = ctx.parent_id.as_deref();
        let base = spec.without_use_requirements();

        // everything whose name, version, slot and repository fit
        let mut fitting: Vec<Arc<PackageId>> = Vec::new();
        for repo in self.env.database().repositories() {
            if !repo.capabilities().installable {
                continue;
            }
            for id in self.candidate_ids_in(repo.as_ref(), spec) {
                if match_package_from(self.env, &base, &id, caller)? {
                    fitting.push(id);
                }
            }
        }
        if fitting.is_empty() {
            return Err(Error::NoSuchPackage(spec.to_string()));
        }

        // split into viable candidates and rejections with reasons
        let mut viable: Vec<(Arc<PackageId>, Vec<(UseFlagName, bool)>)> = Vec::new();
        let mut rejected: Vec<String> = Vec::new();
        for id in fitting {
            let reasons = self.env.mask_reasons(&id)?;
            if !reasons.is_empty() {
                rejected.push(format!("{} ({})", id, reasons));
                continue;
            }
            if use_requirements_met(self.env, &spec.use_requirements, &id, caller) {
                viable.push((id, Vec::new()));
                continue;
            }
            match self.auto_enable_overrides(spec, &id, caller) {
                Some(overrides) => viable.push((id, overrides)),
                None => {
                    let unmet: Vec<String> = spec
                        .use_requirements
                        .iter()
                        .filter(|r| !use_requirement_met(self.env, r, &id, caller))
                        .map(|r| r.to_string())
                        .collect();
                    rejected.push(format!("{} (use requirement {})", id, unmet.join(",")));
                }
            }
        }
        if viable.is_empty() {
            return Err(Error::AllMasked {
                spec: spec.to_string(),
                candidates: rejected,
            });
        }

        // group by slot
        let mut slots: Vec<(SlotName, Vec<(Arc<PackageId>, Vec<(UseFlagName, bool)>)>)> =
            Vec::new();
        for (id, overrides) in viable {
            let slot = self.env.metadata(&id)?.slot.clone();
            match slots.iter().position(|(s, _)| *s == slot) {
                Some(i) => slots[i].1.push((id, overrides)),
                None => slots.push((slot, vec![(id, overrides)])),
            }
        }

        // installed copies count by name, whatever their version: the
        // upgrade/downgrade/new-slot accounting needs them all
        let name_only = PackageDepSpec {
            package: spec.package.clone(),
            category: spec.category.clone(),
            package_part: spec.package_part.clone(),
            ..Default::default()
        };
        let installed_ids = self.installed_matches(&name_only, caller)?;
        let wanted_slots: Vec<SlotName> = match self.options.target_slots {
            SlotTargets::All => slots.iter().map(|(s, _)| s.clone()).collect(),
            SlotTargets::Installed => {
                let mut wanted = Vec::new();
                for id in &installed_ids {
                    if let Some(slot) = id.slot() {
                        if slots.iter().any(|(s, _)| s == slot) && !wanted.contains(slot) {
                            wanted.push(slot.clone());
                        }
                    }
                }
                if wanted.is_empty() {
                    return Err(Error::AllMasked {
                        spec: spec.to_string(),
                        candidates: vec!["no installed slot to cover".to_string()],
                    });
                }
                wanted
            }
            SlotTargets::Best => vec![self.best_slot(&slots)],
        };

        let mut selections = Vec::new();
        for slot in wanted_slots {
            let candidates = &slots
                .iter()
                .find(|(s, _)| *s == slot)
                .expect("slot came from the grouping")
                .1;
            selections.push(self.select_in_slot(slot, candidates, &installed_ids)?);
        }
        Ok(selections)
    }

    /// The slot of the highest-version candidate.
    fn best_slot(
        &self,
        slots: &[(SlotName, Vec<(Arc<PackageId>, Vec<(UseFlagName, bool)>)>)],
    ) -> SlotName {
        let mut best: Option<(&SlotName, &Arc<PackageId>)> = None;
        for (slot, candidates) in slots {
            for (id, _) in candidates {
                let better = match &best {
                    None => true,
                    Some((_, b)) => id.version() > b.version(),
                };
                if better {
                    best = Some((slot, id));
                }
            }
        }
        best.expect("at least one viable candidate").0.clone()
    }

    /// Pick the candidate for one slot: installed version first, then
    /// unmasked in the favourite repository, then highest version, ties
    /// by repository priority.
    fn select_in_slot(
        &self,
        slot: SlotName,
        candidates: &[(Arc<PackageId>, Vec<(UseFlagName, bool)>)],
        installed_ids: &[Arc<PackageId>],
    ) -> Result<Selection> {
        let installed_in_slot: Vec<&Arc<PackageId>> = installed_ids
            .iter()
            .filter(|i| i.slot() == Some(&slot))
            .collect();

        // keep the installed version when a candidate still carries it
        for installed in &installed_in_slot {
            if let Some((id, overrides)) = candidates
                .iter()
                .find(|(c, _)| c.version() == installed.version())
            {
                return Ok(Selection {
                    slot,
                    id: id.clone(),
                    overrides: overrides.clone(),
                    installed_in_slot: installed_in_slot
                        .iter()
                        .map(|i| (*i).clone())
                        .collect(),
                    any_installed: !installed_ids.is_empty(),
                });
            }
        }

        let favourite = self.env.database().favourite_repository().cloned();
        let mut best: Option<&(Arc<PackageId>, Vec<(UseFlagName, bool)>)> = None;
        for candidate in candidates {
            let better = match best {
                None => true,
                Some((b, _)) => {
                    let (c_id, _) = candidate;
                    let c_fav = Some(c_id.repository()) == favourite.as_ref();
                    let b_fav = Some(b.repository()) == favourite.as_ref();
                    if c_fav != b_fav {
                        c_fav
                    } else if c_id.version() != b.version() {
                        c_id.version() > b.version()
                    } else {
                        // equal versions: earlier repository wins
                        let c_prio = self
                            .env
                            .database()
                            .repository_priority(c_id.repository())
                            .unwrap_or(usize::MAX);
                        let b_prio = self
                            .env
                            .database()
                            .repository_priority(b.repository())
                            .unwrap_or(usize::MAX);
                        c_prio < b_prio
                    }
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        let (id, overrides) = best.expect("candidates are non-empty");
        Ok(Selection {
            slot,
            id: id.clone(),
            overrides: overrides.clone(),
            installed_in_slot: installed_in_slot.iter().map(|i| (*i).clone()).collect(),
            any_installed: !installed_ids.is_empty(),
        })
    }

    /// USE overrides that would satisfy unmet requirements, if policy
    /// and the candidate's IUSE allow it.
    fn auto_enable_overrides(
        &self,
        spec: &PackageDepSpec,
        id: &Arc<PackageId>,
        caller: Option<&PackageId>,
    ) -> Option<Vec<(UseFlagName, bool)>> {
        if !self.options.auto_enable_use {
            return None;
        }
        let metadata = id.metadata()?;
        let repo = self.env.database().fetch_repository(id.repository()).ok()?;
        let mut overrides = Vec::new();
        for req in &spec.use_requirements {
            if use_requirement_met(self.env, req, id, caller) {
                continue;
            }
            if !metadata.iuse.contains_key(&req.flag) {
                return None;
            }
            let wanted = match req.kind {
                UseRequirementKind::Enabled => true,
                UseRequirementKind::Disabled => false,
                // caller-relative requirements are not auto-fixed
                _ => return None,
            };
            if wanted && repo.query_use_mask(&req.flag, Some(id)) {
                return None;
            }
            if !wanted && repo.query_use_force(&req.flag, Some(id)) {
                return None;
            }
            overrides.push((req.flag.clone(), wanted));
        }
        debug!(id = %id, ?overrides, "auto-enabling USE flags for requirement");
        Some(overrides)
    }

    fn record_selection(
        &mut self,
        spec: &PackageDepSpec,
        ctx: &TraversalCtx,
        selection: Selection,
        qpn_entries: &[usize],
    ) -> Result<()> {
        let Selection {
            slot,
            id,
            overrides,
            installed_in_slot,
            any_installed,
        } = selection;

        // an entry already holds this slot but could not absorb the
        // spec: the requirements genuinely conflict
        if let Some(existing) = self.merged.get(&(id.name().clone(), slot.clone())) {
            if qpn_entries.contains(existing) {
                let chosen = self.entries[*existing]
                    .package_id
                    .as_ref()
                    .map(|i| i.to_string())
                    .unwrap_or_default();
                return Err(Error::ConflictingRequirement {
                    spec: spec.to_string(),
                    chosen,
                });
            }
        }

        let installed_same_version = installed_in_slot
            .iter()
            .find(|i| i.version() == id.version())
            .cloned();

        // already installed and no reason to redo it
        if let Some(installed) = &installed_same_version {
            let redo = match self.options.reinstall {
                ReinstallPolicy::Never => false,
                ReinstallPolicy::Always => true,
                ReinstallPolicy::IfUseChanged => self.use_changed(installed, &id, &overrides)?,
            };
            if !redo {
                let idx = self.push_entry(DepListEntry {
                    kind: DepListEntryKind::AlreadyInstalled,
                    package_id: Some(installed.clone()),
                    spec: spec.clone(),
                    destination: None,
                    tags: vec![ctx.tag.clone()],
                    change: None,
                    mask_reasons: MaskReasons::none(),
                    use_overrides: Vec::new(),
                });
                self.merged.insert((id.name().clone(), slot), idx);
                self.add_arrow(idx, ctx);
                return Ok(());
            }
        }

        // downgrade accounting
        let newest_installed = installed_in_slot
            .iter()
            .max_by(|a, b| a.version().cmp(b.version()))
            .cloned();
        if let Some(installed) = &newest_installed {
            if installed.version() > id.version()
                && self.options.downgrade == DowngradePolicy::Error
            {
                return Err(Error::DowngradeNotAllowed {
                    package: id.name().to_string(),
                    installed: installed.version().to_string(),
                    candidate: id.version().to_string(),
                });
            }
        }

        let change = if let Some(installed) = &newest_installed {
            if installed.version() == id.version() {
                ChangeType::Rebuild
            } else if installed.version() < id.version() {
                ChangeType::Upgrade {
                    from: installed.version().clone(),
                }
            } else {
                ChangeType::Downgrade {
                    from: installed.version().clone(),
                }
            }
        } else if any_installed {
            ChangeType::NewSlot
        } else {
            ChangeType::New
        };

        let suggested_only =
            ctx.role == DepRole::Suggest && self.options.suggested == SuggestedPolicy::Show;
        let kind = if suggested_only {
            DepListEntryKind::Suggested
        } else {
            DepListEntryKind::Package
        };

        let destination = if kind.is_installable() {
            let destinations = self.env.default_destinations();
            let destination = destinations
                .first()
                .ok_or_else(|| Error::NoDestination(id.to_string()))?;
            Some(destination.name().clone())
        } else {
            None
        };

        debug!(id = %id, ?kind, ?change, "recording plan entry");
        let idx = self.push_entry(DepListEntry {
            kind,
            package_id: Some(id.clone()),
            spec: spec.clone(),
            destination,
            tags: vec![ctx.tag.clone()],
            change: Some(change),
            mask_reasons: MaskReasons::none(),
            use_overrides: overrides.clone(),
        });
        self.merged.insert((id.name().clone(), slot), idx);
        self.add_arrow(idx, ctx);

        if suggested_only {
            return Ok(());
        }
        self.recurse_dependencies(idx, id, overrides)
    }

    /// Did the flags the installed copy was built with change under the
    /// current configuration?
    fn use_changed(
        &self,
        installed: &Arc<PackageId>,
        candidate: &Arc<PackageId>,
        overrides: &[(UseFlagName, bool)],
    ) -> Result<bool> {
        let repo = self.env.database().fetch_repository(installed.repository())?;
        let Some(built_with) = repo.installed_use(installed) else {
            return Ok(false);
        };
        let metadata = self.env.metadata(candidate)?;
        for flag in metadata.iuse.keys() {
            let now = overrides
                .iter()
                .find(|(f, _)| f == flag)
                .map(|(_, e)| *e)
                .unwrap_or_else(|| {
                    self.env.query_use(flag, Some(candidate)) == UseFlagState::Enabled
                });
            if now != built_with.contains(flag) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn recurse_dependencies(
        &mut self,
        idx: usize,
        id: Arc<PackageId>,
        overrides: Vec<(UseFlagName, bool)>,
    ) -> Result<()> {
        let metadata = self.env.metadata(&id)?;
        let parent_spec = Box::new(self.entries[idx].spec.clone());
        let make_ctx = |role: DepRole| TraversalCtx {
            parent_entry: Some(idx),
            parent_id: Some(id.clone()),
            parent_overrides: overrides.clone(),
            role,
            tag: DepTag::Dependency {
                parent: id.clone(),
                spec: parent_spec.clone(),
            },
        };

        let build_ctx = make_ctx(DepRole::Build);
        let run_ctx = make_ctx(DepRole::Run);
        let post_ctx = make_ctx(DepRole::Post);
        let suggest_ctx = make_ctx(DepRole::Suggest);
        let result = (|| -> Result<()> {
            self.add_spec_tree(&metadata.build_depend, &build_ctx)?;
            self.add_spec_tree(&metadata.run_depend, &run_ctx)?;
            self.add_spec_tree(&metadata.post_depend, &post_ctx)?;
            if self.options.suggested != SuggestedPolicy::Discard {
                self.add_spec_tree(&metadata.suggested_depend, &suggest_ctx)?;
            }
            Ok(())
        })();
        result.with_context(|| format!("resolving dependencies of {}", id))
    }

    fn add_block(&mut self, block: &BlockDepSpec, ctx: &TraversalCtx) -> Result<()> {
        // a package blocking its own name guards against old versions
        // of itself; the merge replaces them anyway
        if let Some(parent) = &ctx.parent_id {
            if block.blocked.name_matches(parent.name()) {
                return Ok(());
            }
        }
        let blocker = ctx
            .parent_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "target".to_string());

        // against newly scheduled entries; already-installed matches go
        // through the installed-set path below
        for entry in &self.entries {
            if !matches!(
                entry.kind,
                DepListEntryKind::Package | DepListEntryKind::Subpackage
            ) {
                continue;
            }
            let Some(id) = &entry.package_id else {
                continue;
            };
            if match_package_from(self.env, &block.blocked, id, ctx.parent_id.as_deref())? {
                return Err(Error::Block {
                    blocker,
                    blocked: id.to_string(),
                    strong: block.strong,
                });
            }
        }

        // against the installed set
        for installed in self.installed_matches(&block.blocked, ctx.parent_id.as_deref())? {
            let replaced = self.entries.iter().any(|e| {
                e.kind == DepListEntryKind::Package
                    && e.package_id.as_ref().is_some_and(|id| {
                        id.name() == installed.name() && id.version() != installed.version()
                    })
            });
            if replaced {
                continue;
            }
            if block.strong {
                return Err(Error::Block {
                    blocker,
                    blocked: installed.to_string(),
                    strong: true,
                });
            }
            debug!(blocked = %installed, "weak block against installed package");
            let idx = self.push_entry(DepListEntry {
                kind: DepListEntryKind::Block,
                package_id: Some(installed.clone()),
                spec: block.blocked.clone(),
                destination: None,
                tags: vec![ctx.tag.clone()],
                change: None,
                mask_reasons: MaskReasons::none(),
                use_overrides: Vec::new(),
            });
            self.add_arrow(idx, ctx);
        }
        Ok(())
    }

    fn record_masked_target(
        &mut self,
        spec: &PackageDepSpec,
        ctx: &TraversalCtx,
        err: Error,
    ) -> Result<()> {
        debug!(spec = %spec, "recording masked target entry");
        // surface the best candidate with its reasons when one exists
        let mut best: Option<(Arc<PackageId>, MaskReasons)> = None;
        for repo in self.env.database().repositories() {
            if !repo.capabilities().installable {
                continue;
            }
            for id in self.candidate_ids_in(repo.as_ref(), spec) {
                if !match_package_from(
                    self.env,
                    &spec.without_use_requirements(),
                    &id,
                    ctx.parent_id.as_deref(),
                )? {
                    continue;
                }
                let reasons = self.env.mask_reasons(&id)?;
                let better = match &best {
                    None => true,
                    Some((b, _)) => id.version() > b.version(),
                };
                if better {
                    best = Some((id, reasons));
                }
            }
        }
        match best {
            Some((id, reasons)) => {
                self.push_entry(DepListEntry {
                    kind: DepListEntryKind::Masked,
                    package_id: Some(id),
                    spec: spec.clone(),
                    destination: None,
                    tags: vec![ctx.tag.clone()],
                    change: None,
                    mask_reasons: reasons,
                    use_overrides: Vec::new(),
                });
                Ok(())
            }
            None => Err(err),
        }
    }

    fn push_entry(&mut self, entry: DepListEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    fn add_arrow(&mut self, idx: usize, ctx: &TraversalCtx) {
        let Some(parent) = ctx.parent_entry else {
            return;
        };
        let arrow = match ctx.role {
            DepRole::Target => return,
            DepRole::Build => Arrow::new(idx, parent, ArrowKind::Pre),
            DepRole::Run => Arrow::new(idx, parent, ArrowKind::PreRuntime),
            DepRole::Post => Arrow::new(parent, idx, ArrowKind::Post),
            DepRole::Suggest => Arrow::new(idx, parent, ArrowKind::Suggest),
        };
        self.arrows.push(arrow);
    }
}

/// One chosen candidate for one slot
struct Selection {
    slot: SlotName,
    id: Arc<PackageId>,
    overrides: Vec<(UseFlagName, bool)>,
    installed_in_slot: Vec<Arc<PackageId>>,
    any_installed: bool,
}
