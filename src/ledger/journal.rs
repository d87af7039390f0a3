//! Undo journal for ledger operations
//!
//! The first time an operation changes an entry of the world state, the
//! entry's prior value is saved. Rolling back writes the saved values back,
//! so undoing an operation only touches what that operation changed.

use crate::contract::Contract;
use crate::core::{Address, Amount};
use crate::multisig::{MultisigWallet, WalletFactory};
use std::collections::HashMap;
use std::hash::Hash;

/// Prior values of the entries of one map
#[derive(Debug)]
pub struct Undo<K, V> {
    /// `None` when the entry did not exist before the operation
    saved: HashMap<K, Option<V>>,
}

impl<K, V> Default for Undo<K, V> {
    fn default() -> Self {
        Self {
            saved: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Undo<K, V> {
    /// Save `current` as the prior value of `key`, unless one is already saved
    pub fn save(&mut self, key: K, current: Option<&V>) {
        self.saved.entry(key).or_insert_with(|| current.cloned());
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (K, Option<V>)> {
        self.saved.into_iter()
    }

    /// Write every saved value back, removing entries that did not exist
    pub fn restore_into(self, map: &mut HashMap<K, V>) {
        for (key, prior) in self.into_entries() {
            match prior {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

/// Prior values of everything the running operation changed
#[derive(Debug, Default)]
pub struct Journal {
    pub balances: Undo<Address, Amount>,
    pub wallets: Undo<Address, MultisigWallet>,
    pub factories: Undo<Address, WalletFactory>,
    pub contracts: Undo<Address, Contract>,
    pub nonces: Undo<Address, u64>,
}

impl Journal {
    /// Number of entries saved
    pub fn len(&self) -> usize {
        self.balances.len()
            + self.wallets.len()
            + self.factories.len()
            + self.contracts.len()
            + self.nonces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_save_wins() {
        let mut map: HashMap<u8, u32> = HashMap::from([(1, 10)]);
        let mut undo = Undo::default();

        undo.save(1, map.get(&1));
        map.insert(1, 20);
        undo.save(1, map.get(&1));
        map.insert(1, 30);

        assert_eq!(undo.len(), 1);
        undo.restore_into(&mut map);
        assert_eq!(map[&1], 10);
    }

    #[test]
    fn test_restore_removes_new_entries() {
        let mut map: HashMap<u8, u32> = HashMap::from([(1, 10), (2, 20)]);
        let mut undo = Undo::default();

        undo.save(3, map.get(&3));
        map.insert(3, 30);
        undo.save(2, map.get(&2));
        map.remove(&2);

        undo.restore_into(&mut map);
        assert_eq!(map, HashMap::from([(1, 10), (2, 20)]));
    }

    #[test]
    fn test_journal_counts_every_map() {
        let mut journal = Journal::default();
        assert_eq!(journal.len(), 0);

        let account = Address::random();
        journal.balances.save(account, Some(&5));
        journal.nonces.save(account, None);
        journal.balances.save(account, Some(&7));

        assert_eq!(journal.len(), 2);
    }
}
