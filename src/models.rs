// =============================================================================
// models.rs - THE SACRED DATA STRUCTURES OF PROGRAMMATIC ADVERTISING
// =============================================================================
//
// An ads.txt file is a publisher standing on a rooftop and shouting the
// names of every ad exchange that is allowed to sell its inventory. These
// structs are what's left after we write all of that shouting down.
//
// Two kinds of line survive parsing:
//
//   greenadexchange.com, 12345, DIRECT, d75815a79    <- a Buyer
//   CONTACT=ads@example.com                          <- a Variable
//
// Everything else (comments, blank lines, garbage) evaporates.
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The variables we know how to read.
///
/// The set is closed on purpose. The ads.txt grammar never says whether `=`
/// is allowed inside a buyer record, so a generic `KEY=value` tokenizer
/// would happily eat legitimate buyers. We only recognise these exact
/// prefixes and let everything else fall through to the buyer parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Variable {
    /// Who to email when the ad ops team has questions. Can appear many times.
    Contact,
    /// A subdomain that publishes its own ads.txt.
    Subdomain,
}

impl Variable {
    /// Classification order. CONTACT is tried before SUBDOMAIN, always.
    pub const ALL: [Variable; 2] = [Variable::Contact, Variable::Subdomain];

    /// The variable name as it appears in the file.
    pub fn name(self) -> &'static str {
        match self {
            Variable::Contact => "CONTACT",
            Variable::Subdomain => "SUBDOMAIN",
        }
    }

    /// The literal line prefix, matched case-insensitively.
    ///
    /// Singular `SUBDOMAIN=`. A line spelled `SUBDOMAINS=...` is not a
    /// variable and falls through to the buyer parser.
    pub fn token(self) -> &'static str {
        match self {
            Variable::Contact => "CONTACT=",
            Variable::Subdomain => "SUBDOMAIN=",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a publisher is related to an ad system. Read-only interpretation of
/// [`Buyer::account_type`]; the raw token is what gets stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountType {
    /// The publisher controls the account directly.
    Direct,
    /// Someone else is selling on the publisher's behalf.
    Reseller,
    /// Anything else. The format calls the set open, so we don't judge.
    Other(String),
}

impl AccountType {
    pub fn parse(token: &str) -> Self {
        if token.eq_ignore_ascii_case("DIRECT") {
            AccountType::Direct
        } else if token.eq_ignore_ascii_case("RESELLER") {
            AccountType::Reseller
        } else {
            AccountType::Other(token.to_string())
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Direct => write!(f, "DIRECT"),
            AccountType::Reseller => write!(f, "RESELLER"),
            AccountType::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// One seller relationship: `domain, publisher_id, account_type[, cert_authority]`.
///
/// Every field is whitespace-trimmed and otherwise verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Domain of the advertising system (e.g. `google.com`).
    pub domain: String,

    /// The publisher's account ID on that system.
    pub publisher_id: String,

    /// `DIRECT`, `RESELLER`, or whatever the publisher felt like writing.
    pub account_type: String,

    /// Certification authority ID (TAG-ID). Empty string when absent.
    pub certification_authority: String,
}

impl Buyer {
    pub fn relationship(&self) -> AccountType {
        AccountType::parse(&self.account_type)
    }

    pub fn has_certification_authority(&self) -> bool {
        !self.certification_authority.is_empty()
    }
}

impl fmt::Display for Buyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.domain, self.publisher_id, self.account_type)?;
        if self.has_certification_authority() {
            write!(f, ", {}", self.certification_authority)?;
        }
        Ok(())
    }
}

/// One parsed ads.txt file.
///
/// Built empty by the parser, filled in one line at a time, and handed back
/// only once the scan is finished. Nothing outside this crate can mutate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsTxt {
    source: String,
    buyers: Vec<Buyer>,
    variables: BTreeMap<Variable, Vec<String>>,
}

impl AdsTxt {
    /// An empty document for `source`. Also what a failed retrieval turns into.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            buyers: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Where this document came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Buyer records, in document order.
    pub fn buyers(&self) -> &[Buyer] {
        &self.buyers
    }

    pub fn variables(&self) -> &BTreeMap<Variable, Vec<String>> {
        &self.variables
    }

    /// Every value declared for `variable`, in document order.
    pub fn values(&self, variable: Variable) -> &[String] {
        self.variables
            .get(&variable)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contacts(&self) -> &[String] {
        self.values(Variable::Contact)
    }

    pub fn subdomains(&self) -> &[String] {
        self.values(Variable::Subdomain)
    }

    /// True when no buyers and no variables were recorded. This is how a
    /// failed retrieval looks from the outside.
    pub fn is_empty(&self) -> bool {
        self.buyers.is_empty() && self.variables.is_empty()
    }

    pub(crate) fn push_buyer(&mut self, buyer: Buyer) {
        self.buyers.push(buyer);
    }

    pub(crate) fn push_variable(&mut self, variable: Variable, value: String) {
        self.variables.entry(variable).or_default().push(value);
    }
}

impl fmt::Display for AdsTxt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} buyers, {} contacts, {} subdomains)",
            self.source,
            self.buyers.len(),
            self.contacts().len(),
            self.subdomains().len()
        )
    }
}
