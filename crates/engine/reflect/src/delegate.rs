//! Delegate storage
//!
//! Delegates hold callable targets supplied by whoever binds them (native
//! code or a script runtime). The host only stores and invokes them.

use crate::host::Host;
use crate::value::NativeValue;
use crate::{Error, Result};
use std::fmt;
use std::rc::Rc;

/// Something a delegate can call
pub trait DelegateTarget {
    /// Run the target with the delegate's parameter buffer
    fn execute(&self, host: &Host, params: &mut [NativeValue]) -> Result<()>;

    /// Stable identity, used to find the target again for removal
    fn identity(&self) -> usize;

    fn describe(&self) -> String {
        format!("target@{:#x}", self.identity())
    }
}

/// Single-cast delegate
#[derive(Clone, Default)]
pub struct DelegateValue {
    target: Option<Rc<dyn DelegateTarget>>,
}

impl DelegateValue {
    pub fn bound(target: Rc<dyn DelegateTarget>) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub fn bind(&mut self, target: Rc<dyn DelegateTarget>) {
        self.target = Some(target);
    }

    pub fn unbind(&mut self) {
        self.target = None;
    }

    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&Rc<dyn DelegateTarget>> {
        self.target.as_ref()
    }

    /// Execute the bound target; an unbound delegate is an error
    pub fn execute(&self, host: &Host, params: &mut [NativeValue]) -> Result<()> {
        match &self.target {
            Some(target) => target.execute(host, params),
            None => Err(Error::UnboundDelegate),
        }
    }

    /// Execute the bound target, returning whether anything ran
    pub fn execute_if_bound(&self, host: &Host, params: &mut [NativeValue]) -> Result<bool> {
        match &self.target {
            Some(target) => target.execute(host, params).map(|_| true),
            None => Ok(false),
        }
    }
}

impl PartialEq for DelegateValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (None, None) => true,
            (Some(a), Some(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }
}

impl fmt::Debug for DelegateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "Delegate({})", target.describe()),
            None => f.write_str("Delegate(unbound)"),
        }
    }
}

/// Multicast delegate: an ordered list of targets
#[derive(Clone, Default)]
pub struct MulticastValue {
    targets: Vec<Rc<dyn DelegateTarget>>,
}

impl MulticastValue {
    /// Add a target; a target with the same identity is only added once
    pub fn add(&mut self, target: Rc<dyn DelegateTarget>) {
        let identity = target.identity();
        if !self.targets.iter().any(|t| t.identity() == identity) {
            self.targets.push(target);
        }
    }

    /// Remove the target with the given identity
    pub fn remove(&mut self, identity: usize) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.identity() != identity);
        self.targets.len() != before
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn is_bound(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Invoke every target in order with its own copy of the parameters.
    ///
    /// Iterates a snapshot, so targets may add or remove bindings while the
    /// broadcast is running.
    pub fn broadcast(&self, host: &Host, params: &[NativeValue]) -> Result<()> {
        let targets = self.targets.clone();
        for target in targets {
            let mut args = params.to_vec();
            target.execute(host, &mut args)?;
        }
        Ok(())
    }
}

impl PartialEq for MulticastValue {
    fn eq(&self, other: &Self) -> bool {
        self.targets.len() == other.targets.len()
            && self
                .targets
                .iter()
                .zip(&other.targets)
                .all(|(a, b)| a.identity() == b.identity())
    }
}

impl fmt::Debug for MulticastValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multicast({} targets)", self.targets.len())
    }
}
