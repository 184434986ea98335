//! A small bank ledger kept entirely in memory and rebuilt from its command
//! log on restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use memimg::{BoxError, Command, EventLog, Journal, Processor, TxField};
use serde::{Deserialize, Serialize};

struct Account {
    name: String,
    balance: TxField<i64>,
}

struct Bank {
    accounts: TxField<BTreeMap<String, Arc<Account>>>,
}

impl Bank {
    fn new() -> Self {
        Bank {
            accounts: TxField::unchecked("accounts", BTreeMap::new()),
        }
    }

    fn account(&self, id: &str) -> Result<Arc<Account>, BoxError> {
        self.accounts
            .read(|accounts| accounts.get(id).cloned())
            .ok_or_else(|| format!("no such account: {id}").into())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum BankCommand {
    Open { id: String, name: String },
    Deposit { id: String, amount: i64 },
    Withdraw { id: String, amount: i64 },
    Transfer { from: String, to: String, amount: i64 },
}

impl Command<Bank> for BankCommand {
    type Output = ();

    fn apply(&self, bank: &Bank, journal: &mut Journal) -> Result<(), BoxError> {
        match self {
            BankCommand::Open { id, name } => {
                let account = Arc::new(Account {
                    name: name.clone(),
                    balance: TxField::new("balance", 0i64, |b| *b >= 0)?,
                });
                bank.accounts.update(journal, |accounts| {
                    accounts.insert(id.clone(), account);
                })?;
            }
            BankCommand::Deposit { id, amount } => {
                let account = bank.account(id)?;
                account.balance.set(account.balance.get() + amount, journal)?;
            }
            BankCommand::Withdraw { id, amount } => {
                let account = bank.account(id)?;
                account.balance.set(account.balance.get() - amount, journal)?;
            }
            BankCommand::Transfer { from, to, amount } => {
                BankCommand::Deposit {
                    id: to.clone(),
                    amount: *amount,
                }
                .apply(bank, journal)?;
                BankCommand::Withdraw {
                    id: from.clone(),
                    amount: *amount,
                }
                .apply(bank, journal)?;
            }
        }
        Ok(())
    }
}

fn print_balances(bank: &Bank) {
    bank.accounts.read(|accounts| {
        for (id, account) in accounts {
            println!("  {id} ({}): {}", account.name, account.balance.get());
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bank.jsonl");

    let ledger = Processor::open(Bank::new(), EventLog::open_json(&path)?)?;
    ledger.execute(BankCommand::Open {
        id: "a".into(),
        name: "Alice".into(),
    })?;
    ledger.execute(BankCommand::Deposit {
        id: "a".into(),
        amount: 100,
    })?;
    ledger.execute(BankCommand::Withdraw {
        id: "a".into(),
        amount: 10,
    })?;

    match ledger.execute(BankCommand::Transfer {
        from: "a".into(),
        to: "b".into(),
        amount: 1000,
    }) {
        Ok(()) => println!("transfer succeeded"),
        Err(failure) if !failure.is_fatal() => println!("transfer rejected: {failure}"),
        Err(failure) => return Err(failure.into()),
    }

    println!("\nLive balances:");
    print_balances(ledger.system());
    ledger.close()?;

    println!("\nCommand log:");
    print!("{}", std::fs::read_to_string(&path)?);

    let log = EventLog::<BankCommand, _>::open_json(&path)?;
    let restored = Processor::open(Bank::new(), log)?;
    println!("\nBalances after replay:");
    print_balances(restored.system());

    Ok(())
}
