//! [`EntityStore`]: a keyed collection with secondary uniqueness indexes.
//!
//! The store is the storage primitive the domain graph keeps one of per
//! entity kind. It knows nothing about relationships; it only guarantees that
//! its primary map, its name ordering and its uniqueness index agree after
//! every call, and that a failed call changes nothing.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
  entity::{Entity, UniqueKey},
  error::{Error, Result},
  id::EntityId,
};

#[derive(Debug, Clone)]
pub struct EntityStore<T: Entity> {
  rows:    HashMap<T::Id, T>,
  order:   BTreeSet<(String, T::Id)>,
  unique:  HashMap<UniqueKey, T::Id>,
  retired: HashSet<T::Id>,
}

impl<T: Entity> Default for EntityStore<T> {
  fn default() -> Self {
    Self {
      rows:    HashMap::new(),
      order:   BTreeSet::new(),
      unique:  HashMap::new(),
      retired: HashSet::new(),
    }
  }
}

impl<T: Entity> EntityStore<T> {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn contains(&self, id: T::Id) -> bool { self.rows.contains_key(&id) }

  pub fn get(&self, id: T::Id) -> Option<&T> { self.rows.get(&id) }

  /// Like [`get`](Self::get) but failing with `NotFound`.
  pub fn require(&self, id: T::Id) -> Result<&T> {
    self.get(id).ok_or_else(|| Error::not_found(T::KIND, id))
  }

  /// Every entity ordered by sort key, ties broken by id.
  ///
  /// The iterator borrows the store and can be cloned to walk it again.
  pub fn all(&self) -> impl Iterator<Item = &T> + Clone + '_ {
    self.order.iter().filter_map(|(_, id)| self.rows.get(id))
  }

  /// Look up the entity holding a uniqueness key.
  pub fn find(&self, key: &UniqueKey) -> Option<&T> {
    self.unique.get(key).and_then(|id| self.rows.get(id))
  }

  /// Insert `candidate`, assigning a fresh id if it has none.
  pub fn create(&mut self, mut candidate: T) -> Result<T> {
    if candidate.id().is_unset() {
      candidate.set_id(T::Id::generate());
    }
    let id = candidate.id();
    if self.rows.contains_key(&id) || self.retired.contains(&id) {
      return Err(Error::DuplicateKey {
        kind:  T::KIND,
        field: "id",
        value: id.to_string(),
      });
    }

    let keys = candidate.unique_keys();
    self.check_unique(&keys, None)?;

    for key in keys {
      self.unique.insert(key, id);
    }
    self.order.insert((candidate.sort_key().to_owned(), id));
    self.rows.insert(id, candidate.clone());
    Ok(candidate)
  }

  /// Apply `mutator` to a copy of the entity and commit it if the result
  /// still satisfies every uniqueness constraint.
  ///
  /// The id is not mutable; any change the mutator makes to it is discarded.
  pub fn update(&mut self, id: T::Id, mutator: impl FnOnce(&mut T)) -> Result<T> {
    let current = self.require(id)?;
    let old_keys = current.unique_keys();
    let old_sort = current.sort_key().to_owned();

    let mut next = current.clone();
    mutator(&mut next);
    next.set_id(id);

    let new_keys = next.unique_keys();
    self.check_unique(&new_keys, Some(id))?;

    for key in &old_keys {
      self.unique.remove(key);
    }
    for key in new_keys {
      self.unique.insert(key, id);
    }
    if next.sort_key() != old_sort {
      self.order.remove(&(old_sort, id));
      self.order.insert((next.sort_key().to_owned(), id));
    }
    self.rows.insert(id, next.clone());
    Ok(next)
  }

  /// Remove an entity and return it. Its id is never accepted again.
  pub fn delete(&mut self, id: T::Id) -> Result<T> {
    let removed = self
      .rows
      .remove(&id)
      .ok_or_else(|| Error::not_found(T::KIND, id))?;
    for key in removed.unique_keys() {
      self.unique.remove(&key);
    }
    self.order.remove(&(removed.sort_key().to_owned(), id));
    self.retired.insert(id);
    Ok(removed)
  }

  fn check_unique(&self, keys: &[UniqueKey], except: Option<T::Id>) -> Result<()> {
    for key in keys {
      match self.unique.get(key) {
        Some(holder) if Some(*holder) != except => {
          return Err(Error::DuplicateKey {
            kind:  T::KIND,
            field: key.field,
            value: key.value.clone(),
          });
        }
        _ => {}
      }
    }
    Ok(())
  }
}
