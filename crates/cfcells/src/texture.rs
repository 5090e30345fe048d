use std::path::{Path, PathBuf};

use log::trace;

/// Finds the companion file for a texture name such as "textures/5.crn".
pub trait TextureResolver {
    fn resolve(&self, name: &Path) -> Option<PathBuf>;
}

impl<F> TextureResolver for F
where
    F: Fn(&Path) -> Option<PathBuf>,
{
    fn resolve(&self, name: &Path) -> Option<PathBuf> {
        self(name)
    }
}

/// Resolves nothing. Every texture reference is left unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextures;

impl TextureResolver for NoTextures {
    fn resolve(&self, _name: &Path) -> Option<PathBuf> {
        None
    }
}

/// Looks for texture files in a list of directories.
///
/// A name is tried as given, then under each search directory in order, then under each
/// ancestor of each search directory, nearest first. The first existing file wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPathResolver {
    search_paths: Vec<PathBuf>,
}

impl SearchPathResolver {
    pub fn new<I, P>(search_paths: I) -> SearchPathResolver
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        SearchPathResolver {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn candidates<'a>(&'a self, name: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
        let direct = self.search_paths.iter().map(move |dir| dir.join(name));
        let climbing = self
            .search_paths
            .iter()
            .flat_map(move |dir| dir.ancestors().skip(1).map(move |up| up.join(name)));
        std::iter::once(name.to_path_buf())
            .chain(direct)
            .chain(climbing)
    }
}

impl TextureResolver for SearchPathResolver {
    fn resolve(&self, name: &Path) -> Option<PathBuf> {
        if name.is_absolute() {
            return name.is_file().then(|| name.to_path_buf());
        }
        self.candidates(name).find(|candidate| {
            trace!("Trying texture {}", candidate.display());
            candidate.is_file()
        })
    }
}
