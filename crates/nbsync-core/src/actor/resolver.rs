//! `SharedEntityActor`: serialized access to shared inventory entities
//!
//! Sites, manufacturers, roles, device types, VRFs and prefixes are shared
//! between devices. Routing every get-or-create through one mailbox means
//! two devices reconciled in parallel can never both create the same
//! entity. Results are cached for the lifetime of the run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use ipnet::Ipv4Net;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{debug, info, warn};

use nbsync_netbox::{
    Device, DeviceType, InventoryStore, Manufacturer, NewDeviceType,
    NewPrefix, NewSite, Prefix, Site, StoreError, slugify,
};

use crate::error::{CoreError, ReconcileError};
use crate::message::{
    EnsurePrefix, ResolveDeviceType, ResolveManufacturer, ResolveRole, ResolveSite, ResolveVrf,
    Resolved,
};

/// Arguments for spawning a `SharedEntityActor`
pub struct SharedEntityActorArgs {
    pub store: Arc<dyn InventoryStore>,
}

/// Single-writer cache in front of the store for shared entities
pub struct SharedEntityActor {
    store: Arc<dyn InventoryStore>,
    sites: HashMap<String, u64>,
    manufacturers: Option<Vec<Manufacturer>>,
    roles: HashMap<String, u64>,
    device_types: HashMap<String, u64>,
    vrfs: HashMap<String, Option<u64>>,
    prefixes: HashMap<(Ipv4Net, Option<u64>), u64>,
}

impl SharedEntityActor {
    async fn manufacturers(&mut self) -> Result<&[Manufacturer], ReconcileError> {
        if self.manufacturers.is_none() {
            let list = self.store.list_manufacturers().await?;
            debug!(count = list.len(), "loaded manufacturers");
            self.manufacturers = Some(list);
        }
        Ok(self.manufacturers.as_deref().unwrap_or_default())
    }
}

/// Store models that carry an id
pub(crate) trait HasId {
    fn id(&self) -> u64;
}

macro_rules! impl_has_id {
    ($($ty:ty),*) => {
        $(impl HasId for $ty {
            fn id(&self) -> u64 {
                self.id
            }
        })*
    };
}

impl_has_id!(Site, DeviceType, Prefix, Device);

/// Turn a create result into a resolution; a conflict means someone else
/// created the entity first, so look it up instead
pub(crate) async fn settle<T, F, Fut>(
    entity: &str,
    created: Result<T, StoreError>,
    lookup: F,
) -> Result<Resolved, ReconcileError>
where
    T: HasId,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<u64>, StoreError>>,
{
    match created {
        Ok(created) => Ok(Resolved::created(created.id())),
        Err(e) if e.is_conflict() => {
            warn!(entity, error = %e, "create conflicted, looking up existing entity");
            match lookup().await? {
                Some(id) => Ok(Resolved::existing(id)),
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

impl Actor for SharedEntityActor {
    type Args = SharedEntityActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        debug!(id = %actor_ref.id(), "SharedEntityActor starting");

        Ok(Self {
            store: args.store,
            sites: HashMap::new(),
            manufacturers: None,
            roles: HashMap::new(),
            device_types: HashMap::new(),
            vrfs: HashMap::new(),
            prefixes: HashMap::new(),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        debug!(
            reason = ?reason,
            sites = self.sites.len(),
            device_types = self.device_types.len(),
            prefixes = self.prefixes.len(),
            "SharedEntityActor stopping"
        );
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<ResolveSite> for SharedEntityActor {
    type Reply = Result<Resolved, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ResolveSite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let new = NewSite::named(&msg.name);
        if let Some(id) = self.sites.get(&new.slug) {
            return Ok(Resolved::existing(*id));
        }

        let store = &self.store;
        let slug = new.slug.as_str();

        let resolved = match store.get_site(slug).await? {
            Some(site) => Resolved::existing(site.id),
            None => {
                let created = store.create_site(&new).await;
                let resolved = settle("site", created, move || async move {
                    Ok::<_, StoreError>(store.get_site(slug).await?.map(|s| s.id))
                })
                .await?;
                info!(site = %msg.name, slug, id = resolved.id, "site ready");
                resolved
            }
        };

        self.sites.insert(new.slug.clone(), resolved.id);
        Ok(resolved)
    }
}

impl Message<ResolveManufacturer> for SharedEntityActor {
    type Reply = Result<Resolved, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ResolveManufacturer,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let model = msg.model.to_ascii_lowercase();
        let vendor = msg.vendor.to_ascii_lowercase();
        let manufacturers = self.manufacturers().await?;

        let found = [model.as_str(), vendor.as_str()].into_iter().find_map(|haystack| {
            manufacturers
                .iter()
                .find(|m| !m.slug.is_empty() && haystack.contains(&m.slug.to_ascii_lowercase()))
        });

        match found {
            Some(m) => Ok(Resolved::existing(m.id)),
            None => Err(ReconcileError::ManufacturerUnresolved {
                model: msg.model,
                vendor: msg.vendor,
            }),
        }
    }
}

impl Message<ResolveRole> for SharedEntityActor {
    type Reply = Result<Resolved, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ResolveRole,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(name) = msg.role else {
            return Err(ReconcileError::RoleUnresolved {
                token: msg.token,
                role: None,
            });
        };
        if let Some(id) = self.roles.get(&name) {
            return Ok(Resolved::existing(*id));
        }

        let Some(role) = self.store.get_role(&name).await? else {
            return Err(ReconcileError::RoleUnresolved {
                token: msg.token,
                role: Some(name),
            });
        };

        self.roles.insert(name, role.id);
        Ok(Resolved::existing(role.id))
    }
}

impl Message<ResolveDeviceType> for SharedEntityActor {
    type Reply = Result<Resolved, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ResolveDeviceType,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Some(id) = self.device_types.get(&msg.model) {
            return Ok(Resolved::existing(*id));
        }

        let store = &self.store;
        let model = msg.model.as_str();

        let resolved = match store.get_device_type(model).await? {
            Some(device_type) => Resolved::existing(device_type.id),
            None => {
                let new = NewDeviceType {
                    manufacturer: msg.manufacturer_id,
                    model: model.to_string(),
                    slug: slugify(model),
                };
                let created = store.create_device_type(&new).await;
                let resolved = settle("device_type", created, move || async move {
                    Ok::<_, StoreError>(store.get_device_type(model).await?.map(|t| t.id))
                })
                .await?;
                info!(model, id = resolved.id, "device type ready");
                resolved
            }
        };

        self.device_types.insert(msg.model.clone(), resolved.id);
        Ok(resolved)
    }
}

impl Message<ResolveVrf> for SharedEntityActor {
    type Reply = Result<Option<u64>, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ResolveVrf,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Some(id) = self.vrfs.get(&msg.name) {
            return Ok(*id);
        }

        let id = self.store.get_vrf(&msg.name).await?.map(|vrf| vrf.id);

        if id.is_none() {
            warn!(vrf = %msg.name, "VRF not found in inventory, using global table");
        }
        self.vrfs.insert(msg.name.clone(), id);
        Ok(id)
    }
}

impl Message<EnsurePrefix> for SharedEntityActor {
    type Reply = Result<Resolved, ReconcileError>;

    async fn handle(
        &mut self,
        msg: EnsurePrefix,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let key = (msg.prefix, msg.vrf_id);
        if let Some(id) = self.prefixes.get(&key) {
            return Ok(Resolved::existing(*id));
        }

        let store = &self.store;
        let prefix = &msg.prefix;
        let vrf_id = msg.vrf_id;

        let resolved = match store.get_prefix(prefix, vrf_id).await? {
            Some(found) => Resolved::existing(found.id),
            None => {
                let created = store.create_prefix(&NewPrefix::new(msg.prefix, vrf_id)).await;
                let resolved = settle("prefix", created, move || async move {
                    Ok::<_, StoreError>(store.get_prefix(prefix, vrf_id).await?.map(|p| p.id))
                })
                .await?;
                info!(prefix = %msg.prefix, id = resolved.id, "prefix ready");
                resolved
            }
        };

        self.prefixes.insert(key, resolved.id);
        Ok(resolved)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle used by device reconcilers
#[derive(Clone)]
pub struct SharedEntities {
    actor: ActorRef<SharedEntityActor>,
}

impl SharedEntities {
    /// Spawn the actor for one run
    #[must_use]
    pub fn spawn(store: Arc<dyn InventoryStore>) -> Self {
        let actor = SharedEntityActor::spawn(SharedEntityActorArgs { store });
        Self { actor }
    }

    pub async fn site(&self, name: &str) -> Result<Resolved, ReconcileError> {
        flatten(
            self.actor
                .ask(ResolveSite {
                    name: name.to_string(),
                })
                .await,
        )
    }

    pub async fn manufacturer(&self, model: &str, vendor: &str) -> Result<Resolved, ReconcileError> {
        flatten(
            self.actor
                .ask(ResolveManufacturer {
                    model: model.to_string(),
                    vendor: vendor.to_string(),
                })
                .await,
        )
    }

    pub async fn role(&self, token: &str, role: Option<&str>) -> Result<Resolved, ReconcileError> {
        flatten(
            self.actor
                .ask(ResolveRole {
                    token: token.to_string(),
                    role: role.map(str::to_string),
                })
                .await,
        )
    }

    pub async fn device_type(
        &self,
        model: &str,
        manufacturer_id: u64,
    ) -> Result<Resolved, ReconcileError> {
        flatten(
            self.actor
                .ask(ResolveDeviceType {
                    model: model.to_string(),
                    manufacturer_id,
                })
                .await,
        )
    }

    pub async fn vrf(&self, name: &str) -> Result<Option<u64>, ReconcileError> {
        flatten(
            self.actor
                .ask(ResolveVrf {
                    name: name.to_string(),
                })
                .await,
        )
    }

    pub async fn prefix(
        &self,
        prefix: Ipv4Net,
        vrf_id: Option<u64>,
    ) -> Result<Resolved, ReconcileError> {
        flatten(self.actor.ask(EnsurePrefix { prefix, vrf_id }).await)
    }

    /// Stop the actor once the run is over
    pub async fn shutdown(&self) {
        self.actor.stop_gracefully().await.ok();
    }
}

fn flatten<T, M: std::fmt::Debug>(
    result: Result<T, SendError<M, ReconcileError>>,
) -> Result<T, ReconcileError> {
    result.map_err(|e| match e {
        SendError::HandlerError(err) => err,
        other => ReconcileError::ActorError(other.to_string()),
    })
}
