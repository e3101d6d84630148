//! Library linking: binds deployed library addresses into artifact bytecode.

use alloy_core::primitives::Address;

use crate::{Component, ContractArtifact, LibraryAddresses, ProvisionError, Result};

/// Width of a library placeholder in hex characters (one address).
const PLACEHOLDER_WIDTH: usize = 40;

/// Library shared by both factories.
pub const TOKEN_LIBRARY: &str = "DmmTokenLibrary";
/// Library used by the underlying-token valuator.
pub const STRING_HELPERS: &str = "StringHelpers";

/// A library that must be bound into a component's artifact before deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryBinding {
    pub component: Component,
    pub library: &'static str,
}

/// Every binding required before the corresponding artifact can be deployed.
pub const REQUIRED_BINDINGS: [LibraryBinding; 3] = [
    LibraryBinding {
        component: Component::UnderlyingTokenValuator,
        library: STRING_HELPERS,
    },
    LibraryBinding {
        component: Component::EtherFactory,
        library: TOKEN_LIBRARY,
    },
    LibraryBinding {
        component: Component::TokenFactory,
        library: TOKEN_LIBRARY,
    },
];

/// Bindings required by a single component.
pub fn bindings_for(component: Component) -> impl Iterator<Item = &'static LibraryBinding> {
    REQUIRED_BINDINGS
        .iter()
        .filter(move |binding| binding.component == component)
}

/// The placeholder the compiler leaves for `library` in unlinked bytecode.
///
/// `__<name>` right-padded with underscores to the width of an address.
pub fn placeholder(library: &str) -> String {
    let name: String = library.chars().take(PLACEHOLDER_WIDTH - 4).collect();
    format!("{:_<width$}", format!("__{name}"), width = PLACEHOLDER_WIDTH)
}

/// Bind `library_address` into every placeholder for `library_name` in the artifact.
pub fn link(
    artifact: &mut ContractArtifact,
    library_name: &str,
    library_address: Address,
) -> Result<()> {
    let link_error = |reason: &str| ProvisionError::Link {
        artifact: artifact.name.clone(),
        library: library_name.to_string(),
        reason: reason.to_string(),
    };

    if library_name.is_empty() {
        return Err(link_error("empty library name"));
    }
    if library_address.is_zero() {
        return Err(link_error("library address is the zero address"));
    }

    let placeholder = placeholder(library_name);
    if !artifact.bytecode.contains(&placeholder) {
        return Err(link_error("artifact has no placeholder for this library"));
    }

    let address_hex = hex::encode(library_address.as_slice());
    artifact.bytecode.replace(&placeholder, &address_hex);
    artifact
        .links
        .insert(library_name.to_string(), library_address);

    tracing::debug!(
        artifact = %artifact.name,
        library = library_name,
        address = %library_address,
        "Library linked"
    );

    Ok(())
}

/// Apply every binding the component's artifact requires.
pub fn link_component(
    component: Component,
    artifact: &mut ContractArtifact,
    libraries: &LibraryAddresses,
) -> Result<()> {
    for binding in bindings_for(component) {
        let address = library_address(artifact, libraries, binding.library)?;
        link(artifact, binding.library, address)?;
    }
    Ok(())
}

fn library_address(
    artifact: &ContractArtifact,
    libraries: &LibraryAddresses,
    library: &str,
) -> Result<Address> {
    libraries
        .address_of(library)
        .ok_or_else(|| ProvisionError::Link {
            artifact: artifact.name.clone(),
            library: library.to_string(),
            reason: "no address configured for this library".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlinked(name: &str, libraries: &[&str]) -> ContractArtifact {
        let mut bytecode = String::from("0x6080604052");
        for library in libraries {
            bytecode.push_str("73");
            bytecode.push_str(&placeholder(library));
            bytecode.push_str("6000");
        }
        ContractArtifact::new(name, bytecode)
    }

    #[test]
    fn test_placeholder_shape() {
        let p = placeholder(TOKEN_LIBRARY);
        assert_eq!(p.len(), 40);
        assert_eq!(p, "__DmmTokenLibrary_______________________");

        let long = placeholder("AVeryLongLibraryNameThatDoesNotFitInAnAddress");
        assert_eq!(long.len(), 40);
        assert!(long.starts_with("__AVeryLong"));
        assert!(long.ends_with("FitIn__"));
    }

    #[test]
    fn test_link_replaces_every_occurrence() {
        let mut artifact = unlinked("DmmTokenFactory", &[TOKEN_LIBRARY, TOKEN_LIBRARY]);
        let address = Address::with_last_byte(0x42);

        link(&mut artifact, TOKEN_LIBRARY, address).unwrap();

        assert!(artifact.is_linked());
        assert_eq!(artifact.links.get(TOKEN_LIBRARY), Some(&address));
        assert_eq!(
            artifact
                .bytecode
                .matches("0000000000000000000000000000000000000042")
                .count(),
            2
        );
        assert!(artifact.bytecode.to_bytes().is_ok());
    }

    #[test]
    fn test_link_rejects_zero_address() {
        let mut artifact = unlinked("DmmEtherFactory", &[TOKEN_LIBRARY]);
        let err = link(&mut artifact, TOKEN_LIBRARY, Address::ZERO).unwrap_err();
        assert!(matches!(err, ProvisionError::Link { .. }));
        assert!(!artifact.is_linked());
    }

    #[test]
    fn test_link_rejects_missing_placeholder() {
        let mut artifact = unlinked("UnderlyingTokenValuatorImplV1", &[STRING_HELPERS]);
        let err = link(&mut artifact, TOKEN_LIBRARY, Address::with_last_byte(1)).unwrap_err();
        assert!(
            matches!(err, ProvisionError::Link { ref library, .. } if library == TOKEN_LIBRARY)
        );
    }

    #[test]
    fn test_link_is_not_idempotent_on_one_instance() {
        let mut artifact = unlinked("DmmTokenFactory", &[TOKEN_LIBRARY]);
        link(&mut artifact, TOKEN_LIBRARY, Address::with_last_byte(7)).unwrap();
        // Placeholder is consumed; a fresh instance must be resolved to link again.
        assert!(link(&mut artifact, TOKEN_LIBRARY, Address::with_last_byte(7)).is_err());
    }

    #[test]
    fn test_required_bindings() {
        assert_eq!(bindings_for(Component::EtherFactory).count(), 1);
        assert_eq!(bindings_for(Component::TokenFactory).count(), 1);
        assert_eq!(
            bindings_for(Component::UnderlyingTokenValuator)
                .next()
                .map(|b| b.library),
            Some(STRING_HELPERS)
        );
        assert_eq!(bindings_for(Component::Controller).count(), 0);
    }

    #[test]
    fn test_link_component_uses_configured_libraries() {
        let libraries = LibraryAddresses {
            token_library: Address::with_last_byte(0x11),
            string_helpers: Address::with_last_byte(0x22),
        };
        let mut valuator = unlinked("UnderlyingTokenValuatorImplV1", &[STRING_HELPERS]);
        link_component(Component::UnderlyingTokenValuator, &mut valuator, &libraries).unwrap();
        assert_eq!(valuator.links.get(STRING_HELPERS), Some(&libraries.string_helpers));

        let mut blacklist = unlinked("DmmBlacklistable", &[]);
        link_component(Component::Blacklist, &mut blacklist, &libraries).unwrap();
        assert!(blacklist.links.is_empty());
    }

    #[test]
    fn test_unknown_library_error_names_the_artifact() {
        let libraries = LibraryAddresses {
            token_library: Address::with_last_byte(0x11),
            string_helpers: Address::with_last_byte(0x22),
        };
        let artifact = unlinked("DmmTokenFactory", &["SafeMath"]);

        let err = library_address(&artifact, &libraries, "SafeMath").unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Link { ref artifact, ref library, .. }
                if artifact == "DmmTokenFactory" && library == "SafeMath"
        ));
        assert!(err.to_string().contains("DmmTokenFactory"));
    }
}
