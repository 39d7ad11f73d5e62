//! Component type to stamper dispatch.

use std::collections::BTreeMap;
use std::fmt;

use super::{
    CapacitorStamper, ComponentType, CurrentSourceStamper, DiodeStamper, IgbtStamper,
    InductorStamper, ResistorStamper, Stamper, SwitchStamper, ThyristorStamper,
    VoltageSourceStamper,
};
use crate::error::{PowerSimError, Result};

/// Template stamper per component type.
///
/// Elements never share a template; each receives its own copy from
/// [`instantiate`](Self::instantiate).
#[derive(Debug, Default)]
pub struct StamperRegistry {
    stampers: BTreeMap<ComponentType, Box<dyn Stamper>>,
}

impl StamperRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every [`ComponentType`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in ComponentType::ALL {
            registry.register(kind, default_stamper(kind));
        }
        registry
    }

    /// Register a template, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: ComponentType,
        stamper: Box<dyn Stamper>,
    ) -> Option<Box<dyn Stamper>> {
        self.stampers.insert(kind, stamper)
    }

    /// Remove a template.
    pub fn unregister(&mut self, kind: ComponentType) -> Option<Box<dyn Stamper>> {
        self.stampers.remove(&kind)
    }

    /// Look up a template.
    pub fn get(&self, kind: ComponentType) -> Option<&dyn Stamper> {
        self.stampers.get(&kind).map(|s| s.as_ref())
    }

    /// Look up a template that must exist.
    pub fn get_required(&self, kind: ComponentType) -> Result<&dyn Stamper> {
        self.get(kind).ok_or(PowerSimError::UnregisteredStamper {
            component_type: kind,
        })
    }

    /// Fresh per-element stamper for a type.
    pub fn instantiate(&self, kind: ComponentType) -> Result<Box<dyn Stamper>> {
        Ok(self.get_required(kind)?.instantiate())
    }

    pub fn contains(&self, kind: ComponentType) -> bool {
        self.stampers.contains_key(&kind)
    }

    /// Registered types in tag order.
    pub fn registered_types(&self) -> Vec<ComponentType> {
        self.stampers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.stampers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stampers.is_empty()
    }

    pub fn clear(&mut self) {
        self.stampers.clear();
    }
}

fn default_stamper(kind: ComponentType) -> Box<dyn Stamper> {
    match kind {
        ComponentType::Resistor | ComponentType::ThermalResistance | ComponentType::Reluctance => {
            Box::new(ResistorStamper::default())
        }
        ComponentType::Capacitor | ComponentType::ThermalCapacitance => {
            Box::new(CapacitorStamper::default())
        }
        ComponentType::Inductor => Box::new(InductorStamper::default()),
        ComponentType::VoltageSource
        | ComponentType::TemperatureSource
        | ComponentType::MmfSource => Box::new(VoltageSourceStamper),
        ComponentType::CurrentSource | ComponentType::HeatFlow => Box::new(CurrentSourceStamper),
        ComponentType::Diode => Box::new(DiodeStamper::default()),
        ComponentType::Switch => Box::new(SwitchStamper::ideal()),
        ComponentType::Mosfet => Box::new(SwitchStamper::mosfet()),
        ComponentType::Igbt => Box::new(IgbtStamper::default()),
        ComponentType::Thyristor => Box::new(ThyristorStamper::default()),
    }
}

impl fmt::Display for StamperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StamperRegistry[{} types: ", self.len())?;
        for (i, (kind, stamper)) in self.stampers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{kind} -> {}", stamper.name())?;
        }
        write!(f, "]")
    }
}
