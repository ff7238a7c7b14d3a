//! Administrator contract: cross-cutting pre/post processing over a set of
//! managed objects, reached through a shared extension interface.

use crate::properties::PropertyList;
use crate::source::PropertySpec;
use std::any::Any;
use std::sync::Arc;

/// Metadata an administrator source exposes after initialisation.
#[derive(Debug, Clone, Default)]
pub struct AdministratorSourceMetaData {
    /// Label of the extension interface this administrator acts through.
    /// Managed object sources advertise matching labels in their own
    /// extension metadata.
    pub extension_interface: String,
    /// Duty labels, in duty-key order.
    pub duties: Vec<String>,
}

/// Initialisation context for an [`AdministratorSource`].
#[derive(Debug)]
pub struct AdministratorSourceContext<'a> {
    /// Configured administrator name.
    pub name: &'a str,
    /// Source properties.
    pub properties: &'a PropertyList,
}

/// A live administrator applying duties to extension interfaces.
pub trait Administrator: Send {
    /// Apply the duty with the given key to the administered extensions.
    fn do_duty(
        &mut self,
        duty: usize,
        extensions: &[Arc<dyn Any + Send + Sync>],
    ) -> anyhow::Result<()>;
}

/// Named factory for one category of administrator.
pub trait AdministratorSource: Send + Sync {
    /// Properties this source understands.
    fn specification(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    /// Initialise from configuration. Errors become reported issues.
    fn init(&mut self, context: &AdministratorSourceContext<'_>) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Metadata describing the administered interface and duties.
    fn meta_data(&self) -> AdministratorSourceMetaData;

    /// Create one administrator instance for a scope.
    fn create_administrator(&self) -> Box<dyn Administrator>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tally;

    impl Administrator for Tally {
        fn do_duty(
            &mut self,
            duty: usize,
            extensions: &[Arc<dyn Any + Send + Sync>],
        ) -> anyhow::Result<()> {
            anyhow::ensure!(duty == 0, "unknown duty {}", duty);
            for ext in extensions {
                let counter = ext
                    .downcast_ref::<std::sync::atomic::AtomicUsize>()
                    .ok_or_else(|| anyhow::anyhow!("wrong extension type"))?;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn duty_applies_to_every_extension() {
        let a: Arc<dyn Any + Send + Sync> = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let b: Arc<dyn Any + Send + Sync> = Arc::new(std::sync::atomic::AtomicUsize::new(10));
        let mut admin = Tally;
        admin.do_duty(0, &[a.clone(), b.clone()]).unwrap();

        let a = a.downcast_ref::<std::sync::atomic::AtomicUsize>().unwrap();
        let b = b.downcast_ref::<std::sync::atomic::AtomicUsize>().unwrap();
        assert_eq!(a.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(b.load(std::sync::atomic::Ordering::SeqCst), 11);
    }

    #[test]
    fn unknown_duty_is_an_error() {
        let mut admin = Tally;
        assert!(admin.do_duty(3, &[]).is_err());
    }
}
