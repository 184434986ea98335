#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use memimg::{
    BoxError, Command, EventStore, Journal, MemoryStore, StoreError, TxField, ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Ledger ---------------------------------------------------------------

pub type Amount = i64;

#[derive(Debug, Error, PartialEq)]
pub enum BankError {
    #[error("no such account: {0}")]
    NoSuchAccount(String),
    #[error("account already exists: {0}")]
    DuplicateAccount(String),
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
}

#[derive(Debug)]
pub struct Account {
    pub id: String,
    pub name: String,
    balance: TxField<Amount>,
}

impl Account {
    pub fn new(id: &str, name: &str) -> Result<Self, ValidationError> {
        Ok(Account {
            id: id.to_string(),
            name: name.to_string(),
            balance: TxField::with_validator("balance", 0, |b: &Amount| {
                if *b >= 0 {
                    Ok(())
                } else {
                    Err(format!("balance cannot go negative ({b})"))
                }
            })?,
        })
    }

    pub fn balance(&self) -> Amount {
        self.balance.get()
    }

    fn adjust(&self, delta: Amount, journal: &mut Journal) -> Result<(), ValidationError> {
        self.balance.set(self.balance.get() + delta, journal)
    }
}

#[derive(Debug)]
pub struct Bank {
    accounts: TxField<BTreeMap<String, Arc<Account>>>,
}

impl Default for Bank {
    fn default() -> Self {
        Bank {
            accounts: TxField::unchecked("accounts", BTreeMap::new()),
        }
    }
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.read(|accounts| accounts.get(id).cloned())
    }

    pub fn balances(&self) -> BTreeMap<String, Amount> {
        self.accounts.read(|accounts| {
            accounts
                .iter()
                .map(|(id, account)| (id.clone(), account.balance()))
                .collect()
        })
    }

    fn existing(&self, id: &str) -> Result<Arc<Account>, BankError> {
        self.account(id)
            .ok_or_else(|| BankError::NoSuchAccount(id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BankCommand {
    CreateAccount { id: String, name: String },
    Deposit { account: String, amount: Amount },
    Withdrawal { account: String, amount: Amount },
    Transfer { from: String, to: String, amount: Amount },
}

impl BankCommand {
    pub fn create(id: &str, name: &str) -> Self {
        BankCommand::CreateAccount {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn deposit(account: &str, amount: Amount) -> Self {
        BankCommand::Deposit {
            account: account.to_string(),
            amount,
        }
    }

    pub fn withdrawal(account: &str, amount: Amount) -> Self {
        BankCommand::Withdrawal {
            account: account.to_string(),
            amount,
        }
    }

    pub fn transfer(from: &str, to: &str, amount: Amount) -> Self {
        BankCommand::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }
}

fn positive(amount: Amount) -> Result<Amount, BankError> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(BankError::NonPositiveAmount(amount))
    }
}

impl Command<Bank> for BankCommand {
    type Output = ();

    fn apply(&self, bank: &Bank, journal: &mut Journal) -> Result<(), BoxError> {
        match self {
            BankCommand::CreateAccount { id, name } => {
                if bank.account(id).is_some() {
                    return Err(BankError::DuplicateAccount(id.clone()).into());
                }
                let account = Arc::new(Account::new(id, name)?);
                bank.accounts.update(journal, |accounts| {
                    accounts.insert(id.clone(), account);
                })?;
            }
            BankCommand::Deposit { account, amount } => {
                bank.existing(account)?.adjust(positive(*amount)?, journal)?;
            }
            BankCommand::Withdrawal { account, amount } => {
                bank.existing(account)?.adjust(-positive(*amount)?, journal)?;
            }
            BankCommand::Transfer { from, to, amount } => {
                // Credit first so that an overdraft has something to undo.
                let amount = positive(*amount)?;
                bank.existing(to)?.adjust(amount, journal)?;
                bank.existing(from)?.adjust(-amount, journal)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        match self {
            BankCommand::CreateAccount { .. } => "CreateAccount",
            BankCommand::Deposit { .. } => "Deposit",
            BankCommand::Withdrawal { .. } => "Withdrawal",
            BankCommand::Transfer { .. } => "Transfer",
        }
    }
}

// --- Counter --------------------------------------------------------------

#[derive(Debug)]
pub struct Counter {
    pub value: TxField<i64>,
    pub other: TxField<i64>,
}

impl Default for Counter {
    fn default() -> Self {
        Counter {
            value: TxField::unchecked("value", 0),
            other: TxField::unchecked("other", 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CounterCommand {
    Add { amount: i64 },
    /// Writes both fields, then fails.
    AddThenFail { amount: i64 },
    AddThenPanic { amount: i64 },
    /// Writes `value` three times, optionally failing afterwards.
    SetThrice { values: [i64; 3], fail: bool },
    /// Registers an undo action that itself fails, then fails.
    BrokenUndo,
}

impl Command<Counter> for CounterCommand {
    type Output = i64;

    fn apply(&self, counter: &Counter, journal: &mut Journal) -> Result<i64, BoxError> {
        match self {
            CounterCommand::Add { amount } => {
                counter.value.set(counter.value.get() + amount, journal)?;
                Ok(counter.value.get())
            }
            CounterCommand::AddThenFail { amount } => {
                counter.value.set(counter.value.get() + amount, journal)?;
                counter.other.set(counter.other.get() + amount, journal)?;
                Err("kaboom".into())
            }
            CounterCommand::AddThenPanic { amount } => {
                counter.value.set(counter.value.get() + amount, journal)?;
                panic!("kaboom");
            }
            CounterCommand::SetThrice { values, fail } => {
                for v in values {
                    counter.value.set(*v, journal)?;
                }
                if *fail {
                    return Err("failed after three writes".into());
                }
                Ok(counter.value.get())
            }
            CounterCommand::BrokenUndo => {
                journal.remember(memimg::OwnerId::next(), "cnt", 0, |_| {
                    Err("kaboom during rollback".into())
                });
                Err("kaboom during command execution".into())
            }
        }
    }
}

// --- Stores ---------------------------------------------------------------

/// Memory store whose appends fail once `fail` is switched on.
pub struct FlakyStore<C> {
    pub inner: MemoryStore<C>,
    pub fail: Arc<AtomicBool>,
}

impl<C: Clone> FlakyStore<C> {
    pub fn new(inner: MemoryStore<C>) -> Self {
        FlakyStore {
            inner,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<C: Clone> EventStore<C> for FlakyStore<C> {
    fn replay(
        &mut self,
        apply: &mut dyn FnMut(C) -> Result<(), BoxError>,
    ) -> Result<u64, StoreError> {
        self.inner.replay(apply)
    }

    fn append(&mut self, command: &C) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("medium unwritable")));
        }
        self.inner.append(command)
    }
}
