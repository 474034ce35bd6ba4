//! Loaders for the two tabular config files (§6): the credentials file
//! (`Title,Value` rows) and the symbol-mapping file (`master_symbol,
//! slave_symbol, slave_lot` rows). Grounded on the CSV-based config in
//! `examples/original_source/mt5_connect.py` (`load_symbol_mapping`,
//! `load_master_credentials`), translated to the idiomatic `csv` + `serde`
//! pairing since the teacher workspace otherwise configures itself via TOML.

use crate::errors::CopierError;
use crate::model::{AccountCredentials, Credentials, SymbolMapping};
use std::collections::HashMap;
use std::path::Path;

const REQUIRED_TITLES: &[&str] = &[
    "master_login",
    "master_password",
    "master_server",
    "slave_login",
    "slave_password",
    "slave_server",
];

#[derive(Debug, serde::Deserialize)]
struct CredentialRow {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Reads the `Title,Value` credentials file. Any missing required title is
/// a fatal config error (§7).
pub fn load_credentials(path: impl AsRef<Path>) -> Result<Credentials, CopierError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|source| CopierError::Csv {
        path: path.display().to_string(),
        source,
    })?;

    let mut values: HashMap<String, String> = HashMap::new();
    for row in reader.deserialize::<CredentialRow>() {
        let row = row.map_err(|source| CopierError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        values.insert(row.title, row.value);
    }

    let missing: Vec<&str> = REQUIRED_TITLES
        .iter()
        .filter(|t| !values.contains_key(**t))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CopierError::MissingColumns {
            file: path.display().to_string(),
            missing: missing.join(", "),
        });
    }

    let get = |title: &'static str| -> Result<&String, CopierError> {
        values.get(title).ok_or(CopierError::MissingCredential(title))
    };
    let get_login = |title: &'static str| -> Result<u64, CopierError> {
        get(title)?
            .trim()
            .parse::<u64>()
            .map_err(|_| CopierError::MissingCredential(title))
    };

    Ok(Credentials {
        master: AccountCredentials {
            login: get_login("master_login")?,
            password: get("master_password")?.trim().to_string(),
            server: get("master_server")?.trim().to_string(),
        },
        slave: AccountCredentials {
            login: get_login("slave_login")?,
            password: get("slave_password")?.trim().to_string(),
            server: get("slave_server")?.trim().to_string(),
        },
    })
}

#[derive(Debug, serde::Deserialize)]
struct SymbolMappingRow {
    master_symbol: String,
    slave_symbol: String,
    slave_lot: f64,
}

/// Reads the symbol-mapping table. Entries with `slave_lot <= 0` are
/// rejected at load per the data-model invariant; missing columns are
/// fatal.
pub fn load_symbol_mapping(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, SymbolMapping>, CopierError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|source| CopierError::Csv {
        path: path.display().to_string(),
        source,
    })?;

    {
        let headers = reader
            .headers()
            .map_err(|source| CopierError::Csv {
                path: path.display().to_string(),
                source,
            })?
            .clone();
        let required = ["master_symbol", "slave_symbol", "slave_lot"];
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !headers.iter().any(|h| h == **c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(CopierError::MissingColumns {
                file: path.display().to_string(),
                missing: missing.join(", "),
            });
        }
    }

    let mut out = HashMap::new();
    for row in reader.deserialize::<SymbolMappingRow>() {
        let row = row.map_err(|source| CopierError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        if row.slave_lot <= 0.0 {
            return Err(CopierError::InvalidLotMultiplier {
                symbol: row.master_symbol,
                value: row.slave_lot,
            });
        }
        out.insert(
            row.master_symbol.clone(),
            SymbolMapping {
                master_symbol: row.master_symbol,
                slave_symbol: row.slave_symbol,
                slave_lot: row.slave_lot,
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_valid_credentials() {
        let f = write_temp(
            "Title,Value\nmaster_login,1610001136\nmaster_password,pw1\nmaster_server,Broker-Demo\nslave_login,203188600\nslave_password,pw2\nslave_server,Broker2-Demo\n",
        );
        let creds = load_credentials(f.path()).unwrap();
        assert_eq!(creds.master.login, 1610001136);
        assert_eq!(creds.slave.server, "Broker2-Demo");
    }

    #[test]
    fn missing_credential_title_is_fatal() {
        let f = write_temp("Title,Value\nmaster_login,1\nmaster_password,pw\nmaster_server,s\n");
        let err = load_credentials(f.path()).unwrap_err();
        assert!(matches!(err, CopierError::MissingColumns { .. }));
    }

    #[test]
    fn loads_valid_symbol_mapping() {
        let f = write_temp("master_symbol,slave_symbol,slave_lot\nEURUSD,EURUSD-STD,1.0\nXAUUSD,XAUUSD.m,0.5\n");
        let map = load_symbol_mapping(f.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["XAUUSD"].slave_lot, 0.5);
    }

    #[test]
    fn rejects_non_positive_lot_multiplier() {
        let f = write_temp("master_symbol,slave_symbol,slave_lot\nEURUSD,EURUSD-STD,0\n");
        let err = load_symbol_mapping(f.path()).unwrap_err();
        assert!(matches!(err, CopierError::InvalidLotMultiplier { .. }));
    }

    #[test]
    fn missing_column_in_symbol_mapping_is_fatal() {
        let f = write_temp("master_symbol,slave_symbol\nEURUSD,EURUSD-STD\n");
        let err = load_symbol_mapping(f.path()).unwrap_err();
        assert!(matches!(err, CopierError::MissingColumns { .. }));
    }
}
