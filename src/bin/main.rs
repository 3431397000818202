// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use posting_engine::diagnostics::JsonLinesSink;
use posting_engine::{
    Account, AccountSubtype, AccountType, Engine, EngineConfig, EngineError, EventLog,
    Transaction, TransactionId, TransactionStatus,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Posting Engine - Map and validate transaction CSV files
///
/// Loads a chart of accounts, proposes a debit/credit posting for every
/// transaction and writes the validated postings to stdout.
#[derive(Parser, Debug)]
#[command(name = "posting-engine")]
#[command(about = "Maps transactions to double-entry postings and validates them", long_about = None)]
struct Args {
    /// Chart of accounts CSV
    ///
    /// Expected format: id,code,name,type,subtype[,active,contra,default]
    #[arg(long, value_name = "FILE")]
    accounts: PathBuf,

    /// Transactions CSV
    ///
    /// Expected format: id,description,amount,date[,customer,reference]
    #[arg(long, value_name = "FILE")]
    transactions: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Append the audit stream as JSON lines to this file
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| fail(e)),
        None => EngineConfig::default(),
    };

    let log = match &args.log {
        Some(path) => match File::create(path) {
            Ok(file) => EventLog::new(Arc::new(JsonLinesSink::new(file))),
            Err(e) => fail(format!("Error creating log file '{}': {e}", path.display())),
        },
        None => EventLog::disabled(),
    };

    let engine = Engine::from_config(config, log).unwrap_or_else(|e| fail(e));

    let accounts = open(&args.accounts)
        .and_then(|file| read_accounts(BufReader::new(file)).map_err(|e| e.to_string()))
        .unwrap_or_else(|e| fail(e));
    engine.initialize(accounts).unwrap_or_else(|e| fail(e));

    let transactions = open(&args.transactions)
        .and_then(|file| read_transactions(BufReader::new(file)).map_err(|e| e.to_string()))
        .unwrap_or_else(|e| fail(e));

    if let Err(e) = write_postings(&engine, &transactions, std::io::stdout()) {
        fail(format!("Error writing output: {e}"));
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn open(path: &Path) -> Result<File, String> {
    File::open(path).map_err(|e| format!("Error opening file '{}': {e}", path.display()))
}

/// Raw chart-of-accounts record.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    id: String,
    code: String,
    name: String,
    #[serde(rename = "type")]
    account_type: AccountType,
    subtype: AccountSubtype,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    contra: Option<bool>,
    #[serde(default)]
    default: Option<bool>,
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        let mut account = Account::new(
            &record.id,
            &record.code,
            &record.name,
            record.account_type,
            record.subtype,
        );
        account.is_active = record.active.unwrap_or(true);
        account.is_contra = record.contra.unwrap_or(false);
        account.is_default = record.default.unwrap_or(false);
        account
    }
}

/// Raw transaction record.
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    id: String,
    description: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option")]
    date: Option<NaiveDate>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    reference: Option<String>,
}

impl From<TransactionRecord> for Transaction {
    fn from(record: TransactionRecord) -> Self {
        Transaction {
            id: TransactionId::new(&record.id),
            description: record.description,
            amount: record.amount,
            date: record.date,
            customer: record.customer.filter(|c| !c.is_empty()),
            reference: record.reference.filter(|r| !r.is_empty()),
            status: TransactionStatus::Pending,
            posting: None,
        }
    }
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Reads a chart of accounts. Malformed rows are skipped.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is invalid.
pub fn read_accounts<R: Read>(input: R) -> Result<Vec<Account>, csv::Error> {
    let mut rdr = reader(input);
    let mut accounts = Vec::new();
    for result in rdr.deserialize::<AccountRecord>() {
        match result {
            Ok(record) => accounts.push(record.into()),
            Err(e) => tracing::warn!(error = %e, "skipping malformed account row"),
        }
    }
    Ok(accounts)
}

/// Reads transactions. Malformed rows are skipped; missing amounts and dates
/// are kept so validation can report them.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is invalid.
pub fn read_transactions<R: Read>(input: R) -> Result<Vec<Transaction>, csv::Error> {
    let mut rdr = reader(input);
    let mut transactions = Vec::new();
    for result in rdr.deserialize::<TransactionRecord>() {
        match result {
            Ok(record) => transactions.push(record.into()),
            Err(e) => tracing::warn!(error = %e, "skipping malformed transaction row"),
        }
    }
    Ok(transactions)
}

/// One output row.
#[derive(Debug, Serialize)]
struct PostingRecord {
    tx: String,
    debit: String,
    credit: String,
    confidence: String,
    valid: bool,
    errors: String,
    warnings: String,
}

/// Maps and validates every transaction, writing one CSV row each.
///
/// # CSV Format
///
/// Columns: `tx, debit, credit, confidence, valid, errors, warnings`.
/// Issue codes are joined with `;`. A transaction that cannot be mapped gets
/// empty account columns and the mapping error in `errors`.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_postings<W: Write>(
    engine: &Engine,
    transactions: &[Transaction],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for tx in transactions {
        wtr.serialize(posting_for(engine, tx))?;
    }

    wtr.flush()?;
    Ok(())
}

fn posting_for(engine: &Engine, tx: &Transaction) -> PostingRecord {
    let mapping = match engine.map_transaction(tx) {
        Ok(mapping) => mapping,
        Err(e) => return unmapped(tx, &e),
    };
    let result = engine.validate(tx, Some(&mapping.debit.account), Some(&mapping.credit.account));
    let join = |issues: &[posting_engine::validation::ValidationIssue]| {
        issues.iter().map(|i| i.code.as_str()).collect::<Vec<_>>().join(";")
    };

    PostingRecord {
        tx: tx.id.to_string(),
        debit: mapping.debit.account.code,
        credit: mapping.credit.account.code,
        confidence: format!("{:.2}", mapping.confidence),
        valid: result.is_valid,
        errors: join(&result.errors),
        warnings: join(&result.warnings),
    }
}

fn unmapped(tx: &Transaction, error: &EngineError) -> PostingRecord {
    PostingRecord {
        tx: tx.id.to_string(),
        debit: String::new(),
        credit: String::new(),
        confidence: String::new(),
        valid: false,
        errors: error.to_string(),
        warnings: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ACCOUNTS: &str = "id,code,name,type,subtype,active,contra,default\n\
                            cash,1100,Cash,asset,current-asset,true,false,false\n\
                            sales,4100,Sales Revenue,revenue,operating-revenue,,,\n\
                            rent,6100,Rent,expense,operating-expense,,,\n\
                            ap,2100,Accounts Payable,liability,current-liability,,,\n\
                            bad,9999,Broken,nonsense,current-asset,,,\n";

    fn engine() -> Engine {
        let engine = Engine::new(EventLog::disabled()).unwrap();
        let accounts = read_accounts(Cursor::new(ACCOUNTS)).unwrap();
        engine.initialize(accounts).unwrap();
        engine
    }

    #[test]
    fn parse_accounts_skips_malformed_rows() {
        let accounts = read_accounts(Cursor::new(ACCOUNTS)).unwrap();
        assert_eq!(accounts.len(), 4);
        assert!(accounts.iter().all(|a| a.is_active));
        assert_eq!(accounts[1].account_type, AccountType::Revenue);
    }

    #[test]
    fn parse_transactions_keeps_missing_fields() {
        let csv = "id,description,amount,date\n\
                   t1,Cash receipt from customer,100.00,2024-02-01\n\
                   t2,Office rent,,2024-02-01\n";
        let transactions = read_transactions(Cursor::new(csv)).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].amount, Some(Decimal::new(10000, 2)));
        assert_eq!(transactions[1].amount, None);
    }

    #[test]
    fn writes_validated_postings() {
        let csv = "id,description,amount,date\n\
                   t1,Cash receipt from customer,100.00,2024-02-01\n\
                   t2,Office rent,,2024-02-01\n";
        let transactions = read_transactions(Cursor::new(csv)).unwrap();
        let mut out = Vec::new();
        write_postings(&engine(), &transactions, &mut out).unwrap();

        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "tx,debit,credit,confidence,valid,errors,warnings");
        assert!(lines[1].starts_with("t1,1100,4100,"));
        assert!(lines[1].ends_with(",true,,"));
        assert!(lines[2].starts_with("t2,6100,2100,"));
        assert!(lines[2].contains("TRANSACTION_AMOUNT_MISSING"));
    }
}
