//! Netlist validation.

use crate::components::StamperRegistry;
use crate::error::{PowerSimError, Result};

use super::Netlist;

/// Validate a netlist against a stamper registry before simulation.
///
/// Checks:
/// - Every element type has a registered stamper
/// - Parameter vectors decode for their stamper
/// - Voltage-source-like elements do not short their own terminals
pub fn validate_netlist(netlist: &Netlist, registry: &StamperRegistry) -> Result<()> {
    if netlist.is_empty() {
        return Err(PowerSimError::invalid_topology("netlist has no elements"));
    }

    for element in netlist.elements() {
        let stamper = registry.get_required(element.kind)?;

        if let Some(slot) = element.parameters.iter().position(|v| v.is_nan()) {
            return Err(PowerSimError::invalid_parameter(
                &element.name,
                format!("slot {slot} is NaN"),
            ));
        }
        stamper
            .validate_parameters(&element.parameters)
            .map_err(|message| PowerSimError::invalid_parameter(&element.name, message))?;

        if element.kind.needs_branch() && element.nodes[0] == element.nodes[1] {
            return Err(PowerSimError::invalid_topology(format!(
                "source '{}' connects node {} to itself",
                element.name,
                netlist.node_name(element.nodes[0])
            )));
        }
    }

    Ok(())
}
