//! Test fixtures shared by the unit tests of this crate

use crate::context::{ApplyContext, CommandRunner};
use crate::graph::{GraphNode, NodeMap};
use crate::item::{CannedActionSpec, Item, ItemAttributes};
use crate::types::{CommandOutput, ItemState, ItemStatus, StateDict};
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records what test items were asked to do, across worker threads
#[derive(Debug, Default)]
pub(crate) struct Journal {
    touched: Mutex<Vec<String>>,
    fixed: Mutex<Vec<String>>,
    in_flight: Mutex<BTreeMap<&'static str, usize>>,
    max_in_flight: Mutex<BTreeMap<&'static str, usize>>,
}

impl Journal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn touch(&self, id: &str) {
        let mut touched = self.touched.lock().unwrap();
        if !touched.iter().any(|t| t == id) {
            touched.push(id.to_string());
        }
    }

    /// Ids in the order they were first looked at
    pub(crate) fn order(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.order().iter().position(|t| t == id)
    }

    /// Ids whose fix ran, in order
    pub(crate) fn fixed(&self) -> Vec<String> {
        self.fixed.lock().unwrap().clone()
    }

    /// Highest number of concurrently running fixes seen for a type
    pub(crate) fn max_in_flight(&self, type_name: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(type_name)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, type_name: &'static str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(type_name).or_default();
        *count += 1;
        let mut max = self.max_in_flight.lock().unwrap();
        let seen = max.entry(type_name).or_default();
        *seen = (*seen).max(*count);
    }

    fn leave(&self, type_name: &'static str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(type_name) {
            *count -= 1;
        }
    }
}

/// Configurable fake item
#[derive(Debug)]
pub(crate) struct TestItem {
    type_name: &'static str,
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    blocks: Vec<String>,
    auto_deps: Vec<String>,
    canned: BTreeMap<String, CannedActionSpec>,
    faults: Vec<String>,
    action: bool,
    correct: AtomicBool,
    fix_works: bool,
    fix_error: Option<String>,
    panics: bool,
    delay: Duration,
    journal: Option<Arc<Journal>>,
}

fn strings<I, S>(values: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into)
}

impl TestItem {
    pub(crate) fn new(id: &str) -> Self {
        let (type_name, name) = id.split_once(':').unwrap();
        Self {
            type_name: Box::leak(type_name.to_string().into_boxed_str()),
            name: name.to_string(),
            bundle: "bundle1".to_string(),
            attributes: ItemAttributes::default(),
            blocks: Vec::new(),
            auto_deps: Vec::new(),
            canned: BTreeMap::new(),
            faults: Vec::new(),
            action: false,
            correct: AtomicBool::new(true),
            fix_works: true,
            fix_error: None,
            panics: false,
            delay: Duration::ZERO,
            journal: None,
        }
    }

    pub(crate) fn bundle(mut self, bundle: &str) -> Self {
        self.bundle = bundle.to_string();
        self
    }

    pub(crate) fn needs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.attributes.needs.extend(strings(v));
        self
    }

    pub(crate) fn needed_by<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.attributes.needed_by.extend(strings(v));
        self
    }

    pub(crate) fn triggers<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.attributes.triggers.extend(strings(v));
        self
    }

    pub(crate) fn triggered_by<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        v: I,
    ) -> Self {
        self.attributes.triggered_by.extend(strings(v));
        self
    }

    pub(crate) fn precedes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.attributes.precedes.extend(strings(v));
        self
    }

    pub(crate) fn preceded_by<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        v: I,
    ) -> Self {
        self.attributes.preceded_by.extend(strings(v));
        self
    }

    pub(crate) fn tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.attributes.tags.extend(strings(v));
        self
    }

    pub(crate) fn triggered(mut self) -> Self {
        self.attributes.triggered = true;
        self
    }

    pub(crate) fn cascade_skip(mut self, value: bool) -> Self {
        self.attributes.cascade_skip = Some(value);
        self
    }

    pub(crate) fn unless(mut self, command: &str) -> Self {
        self.attributes.unless = Some(command.to_string());
        self
    }

    pub(crate) fn blocks<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.blocks.extend(strings(v));
        self
    }

    pub(crate) fn auto_deps<I: IntoIterator<Item = S>, S: Into<String>>(mut self, v: I) -> Self {
        self.auto_deps.extend(strings(v));
        self
    }

    pub(crate) fn canned(mut self, name: &str, spec: CannedActionSpec) -> Self {
        self.canned.insert(name.to_string(), spec);
        self
    }

    pub(crate) fn fault(mut self, name: &str) -> Self {
        self.faults.push(name.to_string());
        self
    }

    pub(crate) fn error_on_missing_fault(mut self) -> Self {
        self.attributes.error_on_missing_fault = true;
        self
    }

    pub(crate) fn action(mut self) -> Self {
        self.action = true;
        self
    }

    /// Current state differs from desired state until fixed
    pub(crate) fn incorrect(self) -> Self {
        self.correct.store(false, Ordering::SeqCst);
        self
    }

    /// Fix runs but leaves the item incorrect
    pub(crate) fn broken_fix(mut self) -> Self {
        self.fix_works = false;
        self
    }

    pub(crate) fn fix_error(mut self, message: &str) -> Self {
        self.fix_error = Some(message.to_string());
        self
    }

    pub(crate) fn panics(mut self) -> Self {
        self.panics = true;
        self
    }

    pub(crate) fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub(crate) fn journal(mut self, journal: &Arc<Journal>) -> Self {
        self.journal = Some(Arc::clone(journal));
        self
    }

    fn state(&self, correct: bool) -> ItemState {
        let mut dict = StateDict::new();
        dict.insert("value".to_string(), correct.to_string());
        ItemState::Present(dict)
    }
}

impl Item for TestItem {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bundle(&self) -> &str {
        &self.bundle
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.attributes
    }

    fn auto_deps(&self, _items: &[&dyn Item]) -> Vec<String> {
        self.auto_deps.clone()
    }

    fn canned_actions(&self) -> BTreeMap<String, CannedActionSpec> {
        self.canned.clone()
    }

    fn block_concurrent(&self, _os: &str, _os_version: &[u32]) -> Vec<String> {
        self.blocks.clone()
    }

    fn unavailable_faults(&self) -> Vec<String> {
        self.faults.clone()
    }

    fn is_action(&self) -> bool {
        self.action
    }

    fn desired_state(&self) -> ItemState {
        self.state(true)
    }

    fn current_state(&self, _ctx: &ApplyContext) -> Result<ItemState> {
        if let Some(journal) = &self.journal {
            journal.touch(&self.id());
        }
        Ok(self.state(self.correct.load(Ordering::SeqCst)))
    }

    fn fix(&self, _status: &ItemStatus, _ctx: &ApplyContext) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.touch(&self.id());
            journal.fixed.lock().unwrap().push(self.id());
            journal.enter(self.type_name);
        }
        std::thread::sleep(self.delay);
        if let Some(journal) = &self.journal {
            journal.leave(self.type_name);
        }
        assert!(!self.panics, "{} exploded", self.id());
        if let Some(message) = &self.fix_error {
            bail!("{message}");
        }
        if self.fix_works {
            self.correct.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Wrap test items into unannotated graph nodes
pub(crate) fn node_map(items: Vec<TestItem>) -> NodeMap {
    items
        .into_iter()
        .map(|item| {
            let node = GraphNode::new(Box::new(item), false);
            (node.id.clone(), node)
        })
        .collect()
}

/// Runner whose commands succeed only if listed
#[derive(Debug, Default)]
pub(crate) struct ScriptedRunner {
    succeeding: BTreeSet<String>,
}

impl ScriptedRunner {
    pub(crate) fn succeeding<I: IntoIterator<Item = S>, S: Into<String>>(commands: I) -> Self {
        Self {
            succeeding: strings(commands).collect(),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let success = self.succeeding.contains(command);
        Ok(CommandOutput {
            stdout: Vec::new(),
            stderr: Vec::new(),
            code: Some(if success { 0 } else { 1 }),
            success,
        })
    }
}
