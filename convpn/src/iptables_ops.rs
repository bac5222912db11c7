//! Abstraction over iptables/ip6tables chain and rule operations, so the
//! kill switch is testable without root.
//!
//! Production code is backed by the `iptables` crate, which itself execs
//! the `iptables`/`ip6tables` binaries — the external-binary contract is
//! unchanged, only the string-building is handled by the crate.

pub trait IptablesOps: Send + Sync {
    fn set_policy(&self, chain: &str, policy: &str) -> Result<(), String>;
    fn flush_chain(&self, chain: &str) -> Result<(), String>;
    fn append(&self, chain: &str, rule: &str) -> Result<(), String>;
    fn insert(&self, chain: &str, position: i32, rule: &str) -> Result<(), String>;
    fn list_chains(&self) -> Result<Vec<String>, String>;
    fn delete_chain(&self, chain: &str) -> Result<(), String>;
}

pub struct RealIptablesOps {
    inner: iptables::IPTables,
}

impl RealIptablesOps {
    pub fn new(is_ipv6: bool) -> Result<Self, String> {
        let inner = iptables::new(is_ipv6).map_err(|e| e.to_string())?;
        Ok(Self { inner })
    }
}

impl IptablesOps for RealIptablesOps {
    fn set_policy(&self, chain: &str, policy: &str) -> Result<(), String> {
        self.inner.set_policy("filter", chain, policy).map_err(|e| e.to_string())
    }

    fn flush_chain(&self, chain: &str) -> Result<(), String> {
        self.inner.flush_chain("filter", chain).map_err(|e| e.to_string())
    }

    fn append(&self, chain: &str, rule: &str) -> Result<(), String> {
        self.inner.append("filter", chain, rule).map_err(|e| e.to_string())
    }

    fn insert(&self, chain: &str, position: i32, rule: &str) -> Result<(), String> {
        self.inner.insert("filter", chain, rule, position).map_err(|e| e.to_string())
    }

    fn list_chains(&self) -> Result<Vec<String>, String> {
        self.inner.list_chains("filter").map_err(|e| e.to_string())
    }

    fn delete_chain(&self, chain: &str) -> Result<(), String> {
        self.inner.delete_chain("filter", chain).map(|_| ()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct IptablesState {
        pub policies: HashMap<String, String>,
        pub rules: HashMap<String, Vec<String>>,
        pub chains: Vec<String>,
        pub fail_on: HashMap<String, String>,
    }

    #[derive(Clone)]
    pub struct MockIptablesOps {
        pub state: Arc<Mutex<IptablesState>>,
    }

    impl MockIptablesOps {
        pub fn new() -> Self {
            let chains = vec!["INPUT".to_string(), "FORWARD".to_string(), "OUTPUT".to_string()];
            Self { state: Arc::new(Mutex::new(IptablesState { chains, ..Default::default() })) }
        }

        /// Seeds a stray user chain, the way a leftover UFW chain or a
        /// crashed prior run would leave one behind.
        pub fn with_user_chain(self, chain: &str) -> Self {
            self.state.lock().unwrap().chains.push(chain.to_string());
            self
        }
    }

    impl IptablesOps for MockIptablesOps {
        fn set_policy(&self, chain: &str, policy: &str) -> Result<(), String> {
            let mut s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("set_policy") {
                return Err(msg.clone());
            }
            s.policies.insert(chain.to_string(), policy.to_string());
            Ok(())
        }

        fn flush_chain(&self, chain: &str) -> Result<(), String> {
            let mut s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("flush_chain") {
                return Err(msg.clone());
            }
            s.rules.insert(chain.to_string(), Vec::new());
            Ok(())
        }

        fn append(&self, chain: &str, rule: &str) -> Result<(), String> {
            let mut s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("append") {
                return Err(msg.clone());
            }
            s.rules.entry(chain.to_string()).or_default().push(rule.to_string());
            Ok(())
        }

        fn insert(&self, chain: &str, position: i32, rule: &str) -> Result<(), String> {
            let mut s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("insert") {
                return Err(msg.clone());
            }
            let rules = s.rules.entry(chain.to_string()).or_default();
            let idx = ((position - 1).max(0) as usize).min(rules.len());
            rules.insert(idx, rule.to_string());
            Ok(())
        }

        fn list_chains(&self) -> Result<Vec<String>, String> {
            let s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("list_chains") {
                return Err(msg.clone());
            }
            Ok(s.chains.clone())
        }

        fn delete_chain(&self, chain: &str) -> Result<(), String> {
            let mut s = self.state.lock().unwrap();
            if let Some(msg) = s.fail_on.get("delete_chain") {
                return Err(msg.clone());
            }
            s.chains.retain(|c| c != chain);
            s.rules.remove(chain);
            Ok(())
        }
    }
}
