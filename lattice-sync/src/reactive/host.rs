//! Host Builder
//!
//! Hosting grafts a new subtree onto a [`ReactiveModel`] and gives it a
//! lifetime of its own, derived from the nearest ancestor that has one.
//! Builders may host further subtrees inside the one being built; however
//! deep the nesting, the whole construction lands as a single transaction.
//!
//! # How It Works
//!
//! An [`Initializer`] keeps a working view of the tree and the list of
//! mutations applied to it so far. Every mutation is applied to the view at
//! once, so nested hosts can find the lifetimes of subtrees that are not yet
//! committed. When the outermost host call returns, the mutations are
//! replayed onto the live root in one transaction and the initializer
//! expires.

use std::mem;

use crate::error::{Error, Result};
use crate::lifetime::Lifetime;
use crate::model::{HostMarker, MapModel, Model};
use crate::path::Path;

use super::model::ReactiveModel;

type Mutation = Box<dyn Fn(Model) -> Model + Send + Sync>;

/// Accumulates the mutations of one host build.
pub struct Initializer<'a> {
    model: &'a ReactiveModel,
    view: Model,
    mutations: Vec<Mutation>,
    /// Number of host calls currently running.
    depth: usize,
    expired: bool,
}

impl<'a> Initializer<'a> {
    pub(crate) fn new(model: &'a ReactiveModel) -> Self {
        Self {
            model,
            view: Model::Map(model.root()),
            mutations: Vec::new(),
            depth: 0,
            expired: false,
        }
    }

    /// The tree as it will look once the build commits, so far.
    pub fn view(&self) -> &Model {
        &self.view
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Add a mutation to the pending transaction.
    ///
    /// `f` is applied to the working view now and replayed onto the live
    /// root at commit, so it must give the same result both times.
    pub fn mutate<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(Model) -> Model + Send + Sync + 'static,
    {
        if self.expired {
            return Err(Error::InitializerExpired);
        }
        self.push(f);
        Ok(())
    }

    fn push<F>(&mut self, f: F)
    where
        F: Fn(Model) -> Model + Send + Sync + 'static,
    {
        self.view = f(mem::take(&mut self.view));
        self.mutations.push(Box::new(f));
    }

    /// Host an empty map at `path` and let `builder` fill it in.
    ///
    /// The new subtree's lifetime is a child of the lifetime found on the
    /// nearest ancestor of `path`. `builder` receives the hosted path (with
    /// any [`Last`](crate::Segment::Last) segment pinned to the index it
    /// landed on), the new lifetime and this initializer. Once it returns,
    /// the subtree is marked with a [`HostMarker`] and `tags`. The outermost
    /// call commits everything and expires the initializer.
    ///
    /// If `builder` fails, its mutations are discarded and the new lifetime
    /// is terminated.
    pub fn host<F>(&mut self, path: &Path, tags: &[&str], builder: F) -> Result<Lifetime>
    where
        F: FnOnce(&Path, &Lifetime, &mut Initializer<'a>) -> Result<()>,
    {
        if self.expired {
            return Err(Error::InitializerExpired);
        }
        let parent = self
            .ancestor_lifetime(path)
            .ok_or_else(|| Error::MissingLifetime(path.clone()))?;
        let lifetime = parent.create_child();
        let checkpoint = (self.mutations.len(), self.view.clone());

        {
            let path = path.clone();
            let lifetime = lifetime.clone();
            self.push(move |model| path.put_in(model, MapModel::with_lifetime(lifetime.clone())));
        }
        let path = path.resolve(&self.view);
        tracing::debug!(path = %path, lifetime = lifetime.id(), depth = self.depth, "hosting subtree");

        self.depth += 1;
        let built = builder(&path, &lifetime, self);
        self.depth -= 1;

        if let Err(err) = built {
            tracing::debug!(path = %path, error = %err, "host builder failed; discarding subtree");
            let (len, view) = checkpoint;
            self.mutations.truncate(len);
            self.view = view;
            lifetime.terminate();
            if self.depth == 0 {
                self.expired = true;
            }
            return Err(err);
        }

        let marker = HostMarker { path: path.clone() };
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        {
            let path = path.clone();
            self.push(move |model| path.update_in(model, |node| mark(node, &marker, &tags)));
        }

        if self.depth == 0 {
            self.commit(&path, &lifetime)?;
        }
        Ok(lifetime)
    }

    fn commit(&mut self, path: &Path, lifetime: &Lifetime) -> Result<()> {
        self.expired = true;
        let mutations = mem::take(&mut self.mutations);
        tracing::debug!(path = %path, mutations = mutations.len(), "committing host build");

        let committed = self
            .model
            .transaction(move |root| mutations.iter().fold(root, |model, mutation| mutation(model)));
        if committed.is_err() {
            lifetime.terminate();
        }
        committed
    }

    /// The lifetime on the nearest proper ancestor of `path` in the view.
    fn ancestor_lifetime(&self, path: &Path) -> Option<Lifetime> {
        let mut current = path.parent()?;
        loop {
            if let Some(lifetime) = current.get_in(&self.view).and_then(Model::lifetime) {
                return Some(lifetime.clone());
            }
            current = current.parent()?;
        }
    }
}

fn mark(node: Model, marker: &HostMarker, tags: &[String]) -> Model {
    match node {
        Model::Map(mut map) => {
            let meta = map.meta_mut();
            meta.host = Some(marker.clone());
            meta.tags = tags.to_vec();
            Model::Map(map)
        }
        other => other,
    }
}
