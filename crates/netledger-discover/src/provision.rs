//! Make sure a target subnet exists in the inventory and learn its id.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use netledger_core::{InventoryClient, InventoryError, Subnet, SubnetTarget};

use crate::error::{DiscoverError, ProvisionError};
use crate::report::ProvisionOutcome;
use crate::retry::RetryPolicy;

/// A target resolved to its inventory subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub subnet: Subnet,
    pub outcome: ProvisionOutcome,
}

/// Creates subnets on first sight and resolves their ids afterwards.
pub struct SubnetProvisioner {
    inventory: Arc<dyn InventoryClient>,
    retry: RetryPolicy,
}

impl SubnetProvisioner {
    pub fn new(inventory: Arc<dyn InventoryClient>, retry: RetryPolicy) -> Self {
        Self { inventory, retry }
    }

    /// Idempotent: the first call creates the subnet, later calls hit the
    /// inventory's duplicate check and resolve the existing one.
    pub async fn ensure(
        &self,
        target: &SubnetTarget,
        cancel: &CancellationToken,
    ) -> Result<Provisioned, ProvisionError> {
        let inventory = self.inventory.as_ref();
        let created = self
            .retry
            .run("create_subnet", cancel, move || async move {
                inventory
                    .create_subnet(target)
                    .await
                    .map_err(DiscoverError::from)
            })
            .await;

        match created {
            Ok(subnet) => Ok(Provisioned {
                subnet,
                outcome: ProvisionOutcome::Created,
            }),
            Err(DiscoverError::Inventory(InventoryError::Conflict(message))) => {
                tracing::info!(cidr = %target, message = %message, "Subnet already exists");
                match self.lookup(target, cancel).await? {
                    Some(subnet) => Ok(Provisioned {
                        subnet,
                        outcome: ProvisionOutcome::AlreadyExists,
                    }),
                    None => Err(ProvisionError::Missing {
                        cidr: target.cidr(),
                    }),
                }
            }
            Err(DiscoverError::Cancelled) => Err(ProvisionError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    cidr = %target,
                    error = %e,
                    "Subnet creation failed, checking inventory"
                );
                match self.lookup(target, cancel).await {
                    Ok(Some(subnet)) => Ok(Provisioned {
                        subnet,
                        outcome: ProvisionOutcome::Recovered,
                    }),
                    Err(ProvisionError::Cancelled) => Err(ProvisionError::Cancelled),
                    _ => Err(ProvisionError::Create {
                        cidr: target.cidr(),
                        source: e,
                    }),
                }
            }
        }
    }

    /// Find the subnet matching `target` by network and prefix length.
    pub async fn lookup(
        &self,
        target: &SubnetTarget,
        cancel: &CancellationToken,
    ) -> Result<Option<Subnet>, ProvisionError> {
        let inventory = self.inventory.as_ref();
        let subnets = self
            .retry
            .run("list_subnets", cancel, move || async move {
                inventory.list_subnets().await.map_err(DiscoverError::from)
            })
            .await
            .map_err(|e| match e {
                DiscoverError::Cancelled => ProvisionError::Cancelled,
                source => ProvisionError::Lookup {
                    cidr: target.cidr(),
                    source,
                },
            })?;

        Ok(subnets.into_iter().find(|s| s.matches(target)))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use netledger_core::{AddressPatch, InventoryAddress, InventoryId, NewAddress, RetryConfig};

    use super::*;

    /// Inventory holding subnets only; creation can be made to fail.
    #[derive(Default)]
    struct SubnetStore {
        subnets: Mutex<Vec<Subnet>>,
        create_error: Mutex<Option<InventoryError>>,
        list_error: Mutex<Option<InventoryError>>,
        creates: AtomicU32,
        lists: AtomicU32,
    }

    #[async_trait]
    impl InventoryClient for SubnetStore {
        async fn list_subnets(&self) -> Result<Vec<Subnet>, InventoryError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.list_error.lock().unwrap().clone() {
                return Err(e);
            }
            Ok(self.subnets.lock().unwrap().clone())
        }

        async fn create_subnet(&self, target: &SubnetTarget) -> Result<Subnet, InventoryError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.create_error.lock().unwrap().clone() {
                return Err(e);
            }
            let mut subnets = self.subnets.lock().unwrap();
            if subnets.iter().any(|s| s.matches(target)) {
                return Err(InventoryError::Conflict("Subnet already exists".into()));
            }
            let subnet = Subnet {
                id: InventoryId::new((subnets.len() + 10).to_string()),
                network: target.network(),
                prefix_len: target.prefix_len(),
                label: target.label().to_string(),
            };
            subnets.push(subnet.clone());
            Ok(subnet)
        }

        async fn find_address(
            &self,
            _ip: Ipv4Addr,
        ) -> Result<Option<InventoryAddress>, InventoryError> {
            Ok(None)
        }

        async fn create_address(
            &self,
            _new: &NewAddress,
        ) -> Result<InventoryAddress, InventoryError> {
            Err(InventoryError::Rejected {
                status: 501,
                message: "not supported".into(),
            })
        }

        async fn update_address(
            &self,
            _id: &InventoryId,
            _patch: &AddressPatch,
        ) -> Result<(), InventoryError> {
            Ok(())
        }
    }

    fn provisioner(store: Arc<SubnetStore>) -> SubnetProvisioner {
        let retry = RetryPolicy::new(&RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        });
        SubnetProvisioner::new(store, retry)
    }

    fn target() -> SubnetTarget {
        SubnetTarget::parse_cidr("192.168.1.0/24", Some("New Subnet 1")).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_conflict_resolves_same_id() {
        let store = Arc::new(SubnetStore::default());
        let p = provisioner(store.clone());
        let cancel = CancellationToken::new();

        let first = p.ensure(&target(), &cancel).await.unwrap();
        assert_eq!(first.outcome, ProvisionOutcome::Created);

        let second = p.ensure(&target(), &cancel).await.unwrap();
        assert_eq!(second.outcome, ProvisionOutcome::AlreadyExists);
        assert_eq!(first.subnet.id, second.subnet.id);
        assert_eq!(store.subnets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_without_match_is_missing() {
        let store = Arc::new(SubnetStore::default());
        let conflict = InventoryError::Conflict("overlaps".into());
        *store.create_error.lock().unwrap() = Some(conflict);
        let p = provisioner(store);

        let cancel = CancellationToken::new();
        let err = p.ensure(&target(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_other_failure_recovered_by_lookup() {
        let store = Arc::new(SubnetStore::default());
        store.subnets.lock().unwrap().push(Subnet {
            id: InventoryId::new("7"),
            network: Ipv4Addr::new(192, 168, 1, 0),
            prefix_len: 24,
            label: "existing".into(),
        });
        *store.create_error.lock().unwrap() = Some(InventoryError::Rejected {
            status: 400,
            message: "Subnet overlaps".into(),
        });
        let p = provisioner(store.clone());

        let cancel = CancellationToken::new();
        let got = p.ensure(&target(), &cancel).await.unwrap();
        assert_eq!(got.outcome, ProvisionOutcome::Recovered);
        assert_eq!(got.subnet.id.as_str(), "7");
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_create_failure_retried_then_reported() {
        let store = Arc::new(SubnetStore::default());
        let refused = InventoryError::Transport("refused".into());
        *store.create_error.lock().unwrap() = Some(refused);
        let p = provisioner(store.clone());

        let cancel = CancellationToken::new();
        let err = p.ensure(&target(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Create { .. }));
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_after_conflict() {
        let store = Arc::new(SubnetStore::default());
        *store.create_error.lock().unwrap() = Some(InventoryError::Conflict("exists".into()));
        *store.list_error.lock().unwrap() = Some(InventoryError::Rejected {
            status: 403,
            message: "forbidden".into(),
        });
        let p = provisioner(store);

        let cancel = CancellationToken::new();
        let err = p.ensure(&target(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Lookup { .. }));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let p = provisioner(Arc::new(SubnetStore::default()));
        let err = p.ensure(&target(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled));
    }
}
