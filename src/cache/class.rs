use dashmap::DashMap;

use crate::{
    api::{assembly_name_matches, RuntimeApi},
    cache::Lookup,
    config::{CacheConfig, ModuleGroup},
    handles::{ClassHandle, ImageHandle},
};

/// Classes by `(namespace, name)`.
///
/// A miss in the declared assembly falls back to the assemblies of every module group whose
/// prefix matches the namespace, then to all loaded assemblies in load order. The result is
/// cached under `(namespace, name)` whichever assembly satisfied it.
#[derive(Debug)]
pub struct ClassCache {
    entries: DashMap<(String, String), Lookup<ClassHandle>>,
    groups: Vec<ModuleGroup>,
}

impl ClassCache {
    /// Creates an empty cache using the module groups of `config`.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        ClassCache {
            entries: DashMap::new(),
            groups: config.module_groups.clone(),
        }
    }

    /// Looks up a class, consulting the runtime only on the first request for the key.
    pub fn find<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        assembly: &str,
        namespace: &str,
        name: &str,
    ) -> Option<ClassHandle> {
        let key = (namespace.to_string(), name.to_string());
        if let Some(cached) = self.entries.get(&key).map(|entry| *entry) {
            return cached.into_option();
        }

        // No domain means the runtime is not up yet; nothing to cache
        let images = loaded_images(runtime)?;
        let class = self.search(runtime, &images, assembly, namespace, name);
        match class {
            Some(class) => log::debug!("class {}.{} -> {:?}", namespace, name, class),
            None => log::debug!("class {}.{} not found", namespace, name),
        }

        self.entries.insert(key, Lookup::from(class));
        class
    }

    /// The cached outcome for a key, `None` if it was never looked up.
    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<Lookup<ClassHandle>> {
        self.entries
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| *entry)
    }

    /// Number of cached keys, resolved or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been looked up yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        images: &[(String, ImageHandle)],
        assembly: &str,
        namespace: &str,
        name: &str,
    ) -> Option<ClassHandle> {
        let mut tried: Vec<ImageHandle> = Vec::new();
        let mut try_image = |image: ImageHandle| {
            if tried.contains(&image) {
                return None;
            }
            tried.push(image);
            runtime.class_from_name(image, namespace, name)
        };

        let declared = images
            .iter()
            .filter(|(image_name, _)| assembly_name_matches(image_name, assembly))
            .find_map(|(_, image)| try_image(*image));
        if declared.is_some() {
            return declared;
        }

        for group in self.groups.iter().filter(|group| group.matches(namespace)) {
            for candidate in &group.assemblies {
                let found = images
                    .iter()
                    .filter(|(image_name, _)| assembly_name_matches(image_name, candidate))
                    .find_map(|(_, image)| try_image(*image));
                if found.is_some() {
                    return found;
                }
            }
        }

        images.iter().find_map(|(_, image)| try_image(*image))
    }
}

fn loaded_images<R: RuntimeApi + ?Sized>(runtime: &R) -> Option<Vec<(String, ImageHandle)>> {
    let domain = runtime.domain()?;
    Some(
        runtime
            .assemblies(domain)
            .into_iter()
            .filter_map(|assembly| runtime.assembly_image(assembly))
            .map(|image| (runtime.image_name(image).unwrap_or_default(), image))
            .collect(),
    )
}
