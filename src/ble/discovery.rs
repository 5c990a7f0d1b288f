//! Service and characteristic discovery.
//!
//! Drives the post-connection sequence: services, then characteristics of
//! every known service, then the per-characteristic actions listed in the
//! UUID registry. Each step is triggered by the transport event reporting
//! the previous one; there is no barrier between services.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::transport::{CharacteristicHandle, PeripheralId, ServiceHandle, Transport};
use crate::ble::uuids::{characteristic_role, service_actions, service_role, CharacteristicRole};

/// Progress of discovery on the active peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscoveryState {
    /// No active peripheral.
    #[default]
    Disconnected,
    /// Connection requested.
    Connecting,
    /// Connected; services requested.
    Connected,
    /// Services known; characteristics requested.
    ServicesDiscovered,
    /// Every known service has had its actions issued.
    Ready,
}

impl std::fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::ServicesDiscovered => write!(f, "Services discovered"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Notification state of a subscribed characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Subscribe request issued, not yet confirmed.
    Pending,
    /// Notifications enabled.
    Active,
    /// The stack refused the subscription.
    Failed,
}

/// Discovery orchestrator for a single active peripheral.
#[derive(Debug, Default)]
pub struct DiscoveryOrchestrator {
    state: DiscoveryState,
    peripheral: Option<PeripheralId>,
    /// Services whose characteristics have been requested.
    requested: HashSet<Uuid>,
    /// Services whose characteristics have been processed.
    completed: HashSet<Uuid>,
    resolved: HashMap<CharacteristicRole, CharacteristicHandle>,
    subscriptions: HashMap<CharacteristicRole, SubscriptionState>,
}

impl DiscoveryOrchestrator {
    /// Create an orchestrator with no active peripheral.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current discovery state.
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// The active peripheral.
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        self.peripheral.as_ref()
    }

    /// Check if `id` is the active peripheral.
    pub fn is_active(&self, id: &PeripheralId) -> bool {
        self.peripheral.as_ref() == Some(id)
    }

    /// Make `id` the active peripheral, forgetting any previous one.
    pub fn begin(&mut self, id: PeripheralId) {
        self.reset();
        debug!("Discovery target set to {}", id);
        self.peripheral = Some(id);
        self.state = DiscoveryState::Connecting;
    }

    /// Forget the active peripheral and everything resolved on it.
    pub fn reset(&mut self) {
        self.state = DiscoveryState::Disconnected;
        self.peripheral = None;
        self.requested.clear();
        self.completed.clear();
        self.resolved.clear();
        self.subscriptions.clear();
    }

    /// Handle a connection. Returns `false` if the peripheral is not active.
    pub fn on_connected<T>(&mut self, id: &PeripheralId, transport: &mut T) -> bool
    where
        T: Transport + ?Sized,
    {
        if !self.is_active(id) {
            debug!("Ignoring connection of inactive peripheral {}", id);
            return false;
        }

        info!("Connected to {}, discovering services", id);
        self.state = DiscoveryState::Connected;
        transport.discover_services(id);
        true
    }

    /// Handle a disconnection. Returns `false` if the peripheral is not active.
    pub fn on_disconnected(&mut self, id: &PeripheralId) -> bool {
        if !self.is_active(id) {
            return false;
        }
        info!("Disconnected from {}", id);
        self.reset();
        true
    }

    /// Request characteristics for every service with a known role.
    pub fn on_services_discovered<T>(
        &mut self,
        id: &PeripheralId,
        services: &[Uuid],
        transport: &mut T,
    ) where
        T: Transport + ?Sized,
    {
        if !self.is_active(id) {
            debug!("Ignoring services of inactive peripheral {}", id);
            return;
        }

        self.state = DiscoveryState::ServicesDiscovered;

        for uuid in services {
            let Some(role) = service_role(uuid) else {
                debug!("Skipping unknown service {}", uuid);
                continue;
            };
            if !self.requested.insert(*uuid) {
                continue;
            }
            debug!("Discovering characteristics of {:?} service", role);
            transport.discover_characteristics(&ServiceHandle::new(id.clone(), *uuid));
        }

        self.update_ready();
    }

    /// Resolve a service's characteristics and issue its registry actions.
    ///
    /// Returns the roles resolved by this call. A repeated callback for a
    /// service that was already processed issues nothing.
    pub fn on_characteristics_discovered<T>(
        &mut self,
        service: &ServiceHandle,
        characteristics: &[Uuid],
        transport: &mut T,
    ) -> Vec<CharacteristicRole>
    where
        T: Transport + ?Sized,
    {
        if !self.is_active(&service.peripheral) {
            debug!(
                "Ignoring characteristics of inactive peripheral {}",
                service.peripheral
            );
            return Vec::new();
        }

        let Some(role) = service_role(&service.uuid) else {
            debug!("Ignoring characteristics of unknown service {}", service.uuid);
            return Vec::new();
        };

        if !self.completed.insert(service.uuid) {
            debug!("Characteristics of {:?} service already processed", role);
            return Vec::new();
        }
        self.requested.insert(service.uuid);

        let mut newly_resolved = Vec::new();
        for uuid in characteristics {
            if let Some(char_role) = characteristic_role(uuid) {
                debug!("Resolved {:?} characteristic", char_role);
                self.resolved
                    .insert(char_role, service.characteristic(*uuid));
                newly_resolved.push(char_role);
            }
        }

        for &(char_role, action) in service_actions(role) {
            let Some(handle) = self.resolved.get(&char_role) else {
                debug!("{:?} characteristic not found, skipping {:?}", char_role, action);
                continue;
            };

            if action.subscribes() {
                transport.subscribe(handle);
                self.subscriptions
                    .insert(char_role, SubscriptionState::Pending);
            }
            if action.reads() {
                transport.read_value(handle);
            }
        }

        self.update_ready();
        newly_resolved
    }

    /// Record the outcome of a subscription request.
    pub fn on_subscribe_status(&mut self, characteristic: &CharacteristicHandle, ok: bool) {
        let Some(role) = self.role_of(characteristic) else {
            return;
        };

        let state = if ok {
            debug!("Subscribed to {:?}", role);
            SubscriptionState::Active
        } else {
            warn!("Subscription to {:?} failed", role);
            SubscriptionState::Failed
        };
        self.subscriptions.insert(role, state);
    }

    /// Handle of a resolved characteristic on the active peripheral.
    pub fn resolve(&self, role: CharacteristicRole) -> Option<&CharacteristicHandle> {
        self.resolved.get(&role)
    }

    /// Role of a characteristic, if it was resolved on the active peripheral.
    pub fn role_of(&self, characteristic: &CharacteristicHandle) -> Option<CharacteristicRole> {
        if !self.is_active(&characteristic.peripheral) {
            return None;
        }
        let role = characteristic_role(&characteristic.uuid)?;
        (self.resolved.get(&role) == Some(characteristic)).then_some(role)
    }

    /// Subscription state of a characteristic.
    pub fn subscription(&self, role: CharacteristicRole) -> Option<SubscriptionState> {
        self.subscriptions.get(&role).copied()
    }

    /// Number of characteristics resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    fn update_ready(&mut self) {
        if self.state == DiscoveryState::ServicesDiscovered
            && !self.requested.is_empty()
            && self.requested.is_subset(&self.completed)
        {
            info!("Discovery complete: {} characteristics", self.resolved.len());
            self.state = DiscoveryState::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockTransport;
    use crate::ble::uuids::*;
    use mockall::predicate::eq;

    fn peripheral() -> PeripheralId {
        PeripheralId::new("meter-1")
    }

    fn status_service() -> ServiceHandle {
        ServiceHandle::new(peripheral(), STATUS_SERVICE_UUID)
    }

    fn connected_orchestrator() -> DiscoveryOrchestrator {
        let mut discovery = DiscoveryOrchestrator::new();
        discovery.begin(peripheral());
        let mut transport = MockTransport::new();
        transport.expect_discover_services().times(1).return_const(());
        assert!(discovery.on_connected(&peripheral(), &mut transport));
        discovery
    }

    fn run_status_discovery(order: &[Uuid]) {
        let mut discovery = connected_orchestrator();
        let mut transport = MockTransport::new();

        transport
            .expect_discover_characteristics()
            .times(1)
            .return_const(());
        discovery.on_services_discovered(&peripheral(), &[STATUS_SERVICE_UUID], &mut transport);

        let service = status_service();
        transport
            .expect_read_value()
            .with(eq(service.characteristic(DEVICE_INFO_CHARACTERISTIC_UUID)))
            .times(1)
            .return_const(());
        transport
            .expect_read_value()
            .with(eq(service.characteristic(STATUS_CHARACTERISTIC_UUID)))
            .times(1)
            .return_const(());
        for uuid in [
            STATUS_CHARACTERISTIC_UUID,
            BUTTON_CHARACTERISTIC_UUID,
            TORCH_CHARACTERISTIC_UUID,
        ] {
            transport
                .expect_subscribe()
                .with(eq(service.characteristic(uuid)))
                .times(1)
                .return_const(());
        }

        let resolved = discovery.on_characteristics_discovered(&service, order, &mut transport);
        assert_eq!(resolved.len(), order.len());
        assert_eq!(discovery.state(), DiscoveryState::Ready);

        // A duplicate callback issues nothing new.
        let again = discovery.on_characteristics_discovered(&service, order, &mut transport);
        assert!(again.is_empty());
    }

    #[test]
    fn test_status_service_actions_in_registry_order() {
        run_status_discovery(&[
            DEVICE_INFO_CHARACTERISTIC_UUID,
            STATUS_CHARACTERISTIC_UUID,
            FLASH_LED_CHARACTERISTIC_UUID,
            TORCH_CHARACTERISTIC_UUID,
            BUTTON_CHARACTERISTIC_UUID,
        ]);
    }

    #[test]
    fn test_status_service_actions_in_reverse_order() {
        run_status_discovery(&[
            BUTTON_CHARACTERISTIC_UUID,
            TORCH_CHARACTERISTIC_UUID,
            FLASH_LED_CHARACTERISTIC_UUID,
            STATUS_CHARACTERISTIC_UUID,
            DEVICE_INFO_CHARACTERISTIC_UUID,
        ]);
    }

    #[test]
    fn test_unknown_services_are_skipped() {
        let mut discovery = connected_orchestrator();
        let mut transport = MockTransport::new();
        transport
            .expect_discover_characteristics()
            .with(eq(ServiceHandle::new(peripheral(), MULTIMETER_SERVICE_UUID)))
            .times(1)
            .return_const(());

        discovery.on_services_discovered(
            &peripheral(),
            &[Uuid::from_u128(0x1800), MULTIMETER_SERVICE_UUID],
            &mut transport,
        );
        assert_eq!(discovery.state(), DiscoveryState::ServicesDiscovered);
    }

    #[test]
    fn test_missing_characteristic_is_skipped() {
        let mut discovery = connected_orchestrator();
        let mut transport = MockTransport::new();
        let service = ServiceHandle::new(peripheral(), DSO_SERVICE_UUID);
        transport
            .expect_subscribe()
            .with(eq(service.characteristic(DSO_READING_CHARACTERISTIC_UUID)))
            .times(1)
            .return_const(());

        discovery.on_characteristics_discovered(
            &service,
            &[DSO_READING_CHARACTERISTIC_UUID, DSO_SETTINGS_CHARACTERISTIC_UUID],
            &mut transport,
        );
        assert!(discovery.resolve(CharacteristicRole::DsoMetadata).is_none());
        assert!(discovery.resolve(CharacteristicRole::DsoSettings).is_some());
    }

    #[test]
    fn test_inactive_peripheral_ignored() {
        let mut discovery = connected_orchestrator();
        let mut transport = MockTransport::new();
        let other = ServiceHandle::new(PeripheralId::new("other"), STATUS_SERVICE_UUID);

        assert!(!discovery.on_connected(&other.peripheral, &mut transport));
        discovery.on_services_discovered(&other.peripheral, &[STATUS_SERVICE_UUID], &mut transport);
        let resolved = discovery.on_characteristics_discovered(
            &other,
            &[STATUS_CHARACTERISTIC_UUID],
            &mut transport,
        );
        assert!(resolved.is_empty());
        assert!(!discovery.on_disconnected(&other.peripheral));
        assert_eq!(discovery.resolved_count(), 0);
    }

    #[test]
    fn test_subscription_tracking_and_reset() {
        let mut discovery = connected_orchestrator();
        let mut transport = MockTransport::new();
        transport.expect_subscribe().return_const(());
        let service = ServiceHandle::new(peripheral(), MULTIMETER_SERVICE_UUID);
        let reading = service.characteristic(MULTIMETER_READING_CHARACTERISTIC_UUID);

        discovery.on_characteristics_discovered(
            &service,
            &[MULTIMETER_READING_CHARACTERISTIC_UUID],
            &mut transport,
        );
        assert_eq!(
            discovery.subscription(CharacteristicRole::MultimeterReading),
            Some(SubscriptionState::Pending)
        );

        discovery.on_subscribe_status(&reading, true);
        assert_eq!(
            discovery.subscription(CharacteristicRole::MultimeterReading),
            Some(SubscriptionState::Active)
        );
        assert_eq!(
            discovery.role_of(&reading),
            Some(CharacteristicRole::MultimeterReading)
        );

        assert!(discovery.on_disconnected(&peripheral()));
        assert_eq!(discovery.state(), DiscoveryState::Disconnected);
        assert!(discovery.resolve(CharacteristicRole::MultimeterReading).is_none());
        assert_eq!(discovery.role_of(&reading), None);
    }
}
