//! In-memory `virsh` for testing and development.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockWriteGuard};

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Result, XmlError};
use crate::tree::{Element, Node};
use crate::virsh::{CmdResult, StoragePool, Virsh};

/// A representative `virsh pool-capabilities` document.
pub const SAMPLE_POOL_CAPABILITIES: &str = r#"<storagepoolCapabilities>
  <pool type='dir' supported='yes'>
    <volOptions>
      <defaultFormat type='raw'/>
      <enum name='targetFormatType'>
        <value>none</value>
        <value>raw</value>
        <value>qcow2</value>
      </enum>
    </volOptions>
  </pool>
  <pool type='fs' supported='yes'>
    <poolOptions>
      <defaultFormat type='auto'/>
      <enum name='sourceFormatType'>
        <value>auto</value>
        <value>ext4</value>
        <value>xfs</value>
      </enum>
    </poolOptions>
    <volOptions>
      <defaultFormat type='raw'/>
      <enum name='targetFormatType'>
        <value>raw</value>
        <value>qcow2</value>
      </enum>
    </volOptions>
  </pool>
  <pool type='logical' supported='yes'>
    <poolOptions>
      <defaultFormat type='lvm2'/>
      <enum name='sourceFormatType'>
        <value>unknown</value>
        <value>lvm2</value>
      </enum>
    </poolOptions>
  </pool>
  <pool type='rbd' supported='yes'>
    <volOptions>
      <defaultFormat type='raw'/>
      <enum name='targetFormatType'/>
    </volOptions>
  </pool>
</storagepoolCapabilities>
"#;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    DumpXml,
    Define,
    Undefine,
    Capabilities,
    Start,
    Delete,
}

/// How an injected failure presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The command runs and exits non-zero.
    Fail,
    /// The command cannot be executed at all.
    ExecError,
}

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    DumpXml(String),
    /// Carries the pool name found in the submitted XML.
    Define(String),
    Undefine(String),
    Capabilities,
    IsPersistent(String),
    IsActive(String),
    Start(String),
    Delete(String),
}

impl MockCall {
    /// Whether the call changes pool state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockCall::Define(_) | MockCall::Undefine(_) | MockCall::Start(_) | MockCall::Delete(_)
        )
    }
}

/// Mock `virsh` backend for testing.
///
/// Pools live in memory with libvirt's state rules: defining assigns a uuid
/// when the XML has none, undefining a running pool leaves it transient, and
/// deleting destroys and undefines. Every call is journaled, and failures can
/// be queued per operation with [`MockVirsh::fail_next`].
pub struct MockVirsh {
    state: RwLock<MockState>,
}

#[derive(Default)]
struct MockState {
    pools: HashMap<String, MockPool>,
    calls: Vec<MockCall>,
    faults: HashMap<MockOp, VecDeque<Fault>>,
    capabilities: String,
}

#[derive(Debug, Clone)]
struct MockPool {
    xml: String,
    active: bool,
    persistent: bool,
}

impl MockVirsh {
    /// Create an empty mock.
    pub fn new() -> Self {
        info!("Creating mock virsh backend");
        Self {
            state: RwLock::new(MockState {
                capabilities: SAMPLE_POOL_CAPABILITIES.to_string(),
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> Result<RwLockWriteGuard<'_, MockState>> {
        self.state
            .write()
            .map_err(|_| XmlError::Internal("Lock poisoned".to_string()))
    }

    /// Add a pool directly, bypassing define. Not journaled.
    pub fn insert_pool(&self, name: &str, xml: &str, active: bool, persistent: bool) -> Result<()> {
        self.state()?.pools.insert(
            name.to_string(),
            MockPool {
                xml: xml.to_string(),
                active,
                persistent,
            },
        );
        Ok(())
    }

    /// Replace the `pool-capabilities` document.
    pub fn set_capabilities(&self, xml: &str) -> Result<()> {
        self.state()?.capabilities = xml.to_string();
        Ok(())
    }

    /// Make the next call of `op` fail. Queued faults are used in order.
    pub fn fail_next(&self, op: MockOp, fault: Fault) -> Result<()> {
        self.state()?.faults.entry(op).or_default().push_back(fault);
        Ok(())
    }

    /// Stored XML of a pool.
    pub fn pool_xml(&self, name: &str) -> Option<String> {
        let state = self.state().ok()?;
        state.pools.get(name).map(|p| p.xml.clone())
    }

    /// Names of all known pools, sorted.
    pub fn pool_names(&self) -> Vec<String> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        let mut names: Vec<String> = state.pools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Only the calls that changed pool state.
    pub fn mutations(&self) -> Vec<MockCall> {
        self.calls().into_iter().filter(MockCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state() {
            state.calls.clear();
        }
    }
}

impl Default for MockVirsh {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn take_fault(&mut self, op: MockOp) -> Option<Fault> {
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

fn command_error(command: String, fault: Fault, stderr: String) -> XmlError {
    XmlError::ExternalCommand {
        command,
        status: match fault {
            Fault::Fail => Some(1),
            Fault::ExecError => None,
        },
        stderr,
    }
}

fn failed(stderr: impl Into<String>) -> CmdResult {
    CmdResult {
        exit_status: 1,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

/// Read name and uuid from a definition, adding a fresh uuid if it has none.
fn prepare_definition(xml: &str) -> Result<(String, String, String)> {
    let mut root = Element::parse(xml)?;
    let name = root
        .child("name")
        .and_then(Element::text)
        .ok_or_else(|| XmlError::not_found("name", "/name"))?;

    let uuid = match root.child("uuid").and_then(Element::text) {
        Some(uuid) => uuid,
        None => {
            let uuid = Uuid::new_v4().to_string();
            let mut element = Element::new("uuid");
            element.set_text(uuid.clone());
            let at = root
                .children
                .iter()
                .position(|n| matches!(n, Node::Element(e) if e.name == "name"))
                .map_or(0, |idx| idx + 1);
            root.children.insert(at, Node::Element(element));
            uuid
        }
    };
    Ok((name, uuid, root.to_xml()?))
}

impl Virsh for MockVirsh {
    fn pool_dumpxml(&self, name: &str) -> Result<String> {
        let mut state = self.state()?;
        state.calls.push(MockCall::DumpXml(name.to_string()));

        if let Some(fault) = state.take_fault(MockOp::DumpXml) {
            return Err(command_error(
                format!("virsh pool-dumpxml {name}"),
                fault,
                "error: injected failure".to_string(),
            ));
        }
        state
            .pools
            .get(name)
            .map(|p| p.xml.clone())
            .ok_or_else(|| {
                command_error(
                    format!("virsh pool-dumpxml {name}"),
                    Fault::Fail,
                    format!("error: failed to get pool '{name}'"),
                )
            })
    }

    #[instrument(skip(self, xml))]
    fn pool_define(&self, xml: &str) -> Result<CmdResult> {
        let mut state = self.state()?;
        let prepared = prepare_definition(xml);
        let name = prepared
            .as_ref()
            .map(|(name, _, _)| name.clone())
            .unwrap_or_default();
        state.calls.push(MockCall::Define(name));

        match state.take_fault(MockOp::Define) {
            Some(Fault::ExecError) => {
                return Err(command_error(
                    "virsh pool-define".to_string(),
                    Fault::ExecError,
                    "failed to execute: injected failure".to_string(),
                ))
            }
            Some(Fault::Fail) => return Ok(failed("error: injected failure")),
            None => {}
        }

        let (name, uuid, xml) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Ok(failed(format!("error: Failed to define pool: {e}"))),
        };

        let clash = state.pools.iter().find(|(other, pool)| {
            **other != name
                && prepare_definition(&pool.xml).is_ok_and(|(_, other_uuid, _)| other_uuid == uuid)
        });
        if let Some((other, _)) = clash {
            return Ok(failed(format!(
                "error: pool '{other}' already exists with uuid {uuid}"
            )));
        }

        let active = state.pools.get(&name).is_some_and(|p| p.active);
        state.pools.insert(
            name.clone(),
            MockPool {
                xml,
                active,
                persistent: true,
            },
        );
        debug!(pool = %name, uuid = %uuid, "Mock pool defined");
        Ok(CmdResult {
            exit_status: 0,
            stdout: format!("Pool {name} defined"),
            stderr: String::new(),
        })
    }

    fn pool_undefine(&self, name: &str) -> Result<()> {
        let mut state = self.state()?;
        state.calls.push(MockCall::Undefine(name.to_string()));

        let command = format!("virsh pool-undefine {name}");
        if let Some(fault) = state.take_fault(MockOp::Undefine) {
            return Err(command_error(command, fault, "error: injected failure".to_string()));
        }

        let Some(pool) = state.pools.get_mut(name).filter(|p| p.persistent) else {
            return Err(command_error(
                command,
                Fault::Fail,
                format!("error: failed to get persistent pool '{name}'"),
            ));
        };
        if pool.active {
            pool.persistent = false;
        } else {
            state.pools.remove(name);
        }
        Ok(())
    }

    fn pool_capabilities(&self) -> Result<String> {
        let mut state = self.state()?;
        state.calls.push(MockCall::Capabilities);

        if let Some(fault) = state.take_fault(MockOp::Capabilities) {
            return Err(command_error(
                "virsh pool-capabilities".to_string(),
                fault,
                "error: injected failure".to_string(),
            ));
        }
        Ok(state.capabilities.clone())
    }
}

impl StoragePool for MockVirsh {
    fn is_pool_persistent(&self, name: &str) -> bool {
        let Ok(mut state) = self.state() else {
            return false;
        };
        state.calls.push(MockCall::IsPersistent(name.to_string()));
        state.pools.get(name).is_some_and(|p| p.persistent)
    }

    fn is_pool_active(&self, name: &str) -> bool {
        let Ok(mut state) = self.state() else {
            return false;
        };
        state.calls.push(MockCall::IsActive(name.to_string()));
        state.pools.get(name).is_some_and(|p| p.active)
    }

    fn start_pool(&self, name: &str) -> bool {
        let Ok(mut state) = self.state() else {
            return false;
        };
        state.calls.push(MockCall::Start(name.to_string()));

        if state.take_fault(MockOp::Start).is_some() {
            return false;
        }
        match state.pools.get_mut(name) {
            Some(pool) if !pool.active => {
                pool.active = true;
                true
            }
            _ => false,
        }
    }

    fn delete_pool(&self, name: &str) -> bool {
        let Ok(mut state) = self.state() else {
            return false;
        };
        state.calls.push(MockCall::Delete(name.to_string()));

        if state.take_fault(MockOp::Delete).is_some() {
            return false;
        }
        state.pools.remove(name).is_some()
    }
}
