//! Small entity model used by the unit tests.

use crate::access::Root;
use crate::backing::Backing;
use crate::collections::{TxList, TxMap, TxSet};
use crate::entity::{self, Entity, EntityState};
use crate::error::CoreResult;
use crate::id::ObjectId;
use crate::persist::{Contents, Load, Persistable};
use crate::record::{RecordReader, RecordWriter};
use std::sync::Arc;

pub(crate) struct AccountFields {
    name: String,
    balance: u64,
}

impl Contents for AccountFields {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(&self.name)?.value(&self.balance)?;
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            name: record.value()?,
            balance: record.value()?,
        })
    }
}

pub(crate) struct Account {
    state: EntityState,
    fields: Arc<Backing<AccountFields>>,
}

impl Account {
    pub(crate) fn new(name: impl Into<String>, balance: u64) -> CoreResult<Arc<Self>> {
        let fields = Backing::new(AccountFields {
            name: name.into(),
            balance,
        });
        entity::create(|state| Self { state, fields })
    }

    pub(crate) fn name(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        Ok(self.fields.read().name.clone())
    }

    pub(crate) fn balance(&self) -> CoreResult<u64> {
        self.state.require_read_access()?;
        Ok(self.fields.read().balance)
    }

    pub(crate) fn set_balance(&self, balance: u64) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().balance = balance;
        Ok(())
    }
}

impl Entity for Account {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        vec![self.fields.clone()]
    }
}

impl Persistable for Account {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.reference(&self.fields);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.fields.object_id())
    }
}

impl Load for Account {
    const KIND: &'static str = "account";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let fields = record.reference()?;
        Ok(entity::restore(id, |state| Self { state, fields }))
    }
}

pub(crate) struct Bank {
    state: EntityState,
    accounts: Arc<TxList<Arc<Account>>>,
    tags: Arc<TxSet<String>>,
    limits: Arc<TxMap<String, u64>>,
}

impl Bank {
    pub(crate) fn new() -> CoreResult<Arc<Self>> {
        let accounts = TxList::new()?;
        let tags = TxSet::new()?;
        let limits = TxMap::new()?;
        entity::create(|state| Self {
            state,
            accounts,
            tags,
            limits,
        })
    }

    pub(crate) fn accounts(&self) -> CoreResult<Arc<TxList<Arc<Account>>>> {
        self.state.require_read_access()?;
        Ok(self.accounts.clone())
    }

    pub(crate) fn tags(&self) -> CoreResult<Arc<TxSet<String>>> {
        self.state.require_read_access()?;
        Ok(self.tags.clone())
    }

    pub(crate) fn limits(&self) -> CoreResult<Arc<TxMap<String, u64>>> {
        self.state.require_read_access()?;
        Ok(self.limits.clone())
    }
}

impl Entity for Bank {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }
}

impl Persistable for Bank {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record
            .reference(&self.accounts)
            .reference(&self.tags)
            .reference(&self.limits);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.accounts.object_id())?;
        record.expect_reference(self.tags.object_id())?;
        record.expect_reference(self.limits.object_id())
    }
}

impl Load for Bank {
    const KIND: &'static str = "bank";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let accounts = record.reference()?;
        let tags = record.reference()?;
        let limits = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            state,
            accounts,
            tags,
            limits,
        }))
    }
}

impl Root for Bank {
    fn create() -> CoreResult<Arc<Self>> {
        Self::new()
    }
}
