//! Static field grammars per document type.
//!
//! Grammars are append-only: past log entries compare confidences produced by
//! these exact patterns, so a pattern change needs a new field key.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Supported source documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DocumentType {
    /// Registro Geral (national identity card)
    #[default]
    #[serde(rename = "RG")]
    Rg,
    /// Carteira Nacional de Habilitação (driver's license)
    #[serde(rename = "CNH")]
    Cnh,
    /// Real-estate broker registration card
    #[serde(rename = "CRECI")]
    Creci,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [DocumentType::Rg, DocumentType::Cnh, DocumentType::Creci];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rg => "RG",
            Self::Cnh => "CNH",
            Self::Creci => "CRECI",
        }
    }

    /// Ordered field grammar for this document type.
    pub fn grammar(&self) -> &'static [FieldDefinition] {
        match self {
            Self::Rg => &RG_GRAMMAR,
            Self::Cnh => &CNH_GRAMMAR,
            Self::Creci => &CRECI_GRAMMAR,
        }
    }

    /// Looks up the definition for `key` in this document type's grammar.
    pub fn field(&self, key: &str) -> Option<&'static FieldDefinition> {
        self.grammar().iter().find(|def| def.key == key)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RG" => Ok(Self::Rg),
            "CNH" => Ok(Self::Cnh),
            "CRECI" => Ok(Self::Creci),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

/// A field pattern with exactly one capture group.
#[derive(Debug)]
pub struct FieldDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub pattern: Regex,
    pub required: bool,
}

fn field(key: &'static str, label: &'static str, pattern: &str, required: bool) -> FieldDefinition {
    // Patterns are compile-time literals covered by the grammar tests.
    let pattern = Regex::new(pattern)
        .unwrap_or_else(|e| panic!("invalid pattern for field {key}: {e}"));
    debug_assert_eq!(pattern.captures_len(), 2, "field {key} needs one capture group");
    FieldDefinition {
        key,
        label,
        pattern,
        required,
    }
}

const NAME: &str = r"(?i)nome[:\s]+([A-Za-zÀ-ÖØ-öø-ÿ]+(?:[ \t]+[A-Za-zÀ-ÖØ-öø-ÿ]+)+)";
const CPF: &str = r"(?i)CPF[^\d\n]{0,6}(\d{3}\.?\d{3}\.?\d{3}-?\d{2})";
const RG: &str = r"(?i)(?:RG|registro geral|identidade)[^\d\n]{0,12}(\d{1,2}\.?\d{3}\.?\d{3}-?[\dX])";
const BIRTH_DATE: &str = r"(?i)(?:data de )?nascimento[:\s]*(\d{2}[/.\-]\d{2}[/.\-]\d{4})";
const ISSUE_DATE: &str = r"(?i)(?:data de )?(?:expedi[çc][ãa]o|emiss[ãa]o)[:\s]*(\d{2}[/.\-]\d{2}[/.\-]\d{4})";
const ISSUER: &str = r"(?i)(?:[óo]rg[ãa]o\s*(?:expedidor|emissor)|emissor)[:\s]*([A-Z]{2,}[ \t]*/?[ \t]*[A-Z]{2})";
const PARENTS: &str = r"(?i)filia[çc][ãa]o[:\s]+([A-Za-zÀ-ÖØ-öø-ÿ]+(?:[ \t]+[A-Za-zÀ-ÖØ-öø-ÿ]+)+)";
const BIRTHPLACE: &str = r"(?i)naturalidade[:\s]+([A-Za-zÀ-ÖØ-öø-ÿ]+(?:[ \t]+[A-Za-zÀ-ÖØ-öø-ÿ]+)*)";

static RG_GRAMMAR: LazyLock<Vec<FieldDefinition>> = LazyLock::new(|| {
    vec![
        field("nomeCompleto", "Nome completo", NAME, true),
        field("rg", "RG", RG, true),
        field("cpf", "CPF", CPF, true),
        field("dataNascimento", "Data de nascimento", BIRTH_DATE, false),
        field("dataExpedicao", "Data de expedição", ISSUE_DATE, false),
        field("orgaoExpedidor", "Órgão expedidor", ISSUER, false),
        field("filiacao", "Filiação", PARENTS, false),
        field("naturalidade", "Naturalidade", BIRTHPLACE, false),
    ]
});

static CNH_GRAMMAR: LazyLock<Vec<FieldDefinition>> = LazyLock::new(|| {
    vec![
        field("nomeCompleto", "Nome completo", NAME, true),
        field(
            "registroCnh",
            "Nº de registro",
            r"(?i)(?:registro|n[º°o]?\s*registro)[^\d\n]{0,12}(\d{11})",
            true,
        ),
        field("cpf", "CPF", CPF, true),
        field(
            "rg",
            "Documento de identidade",
            r"(?i)(?:doc(?:\.|umento)?\s*(?:de\s*)?identidade|RG)[^\d\n]{0,12}(\d{1,2}\.?\d{3}\.?\d{3}-?[\dX])",
            false,
        ),
        field("orgaoExpedidor", "Órgão emissor", ISSUER, false),
        field("dataNascimento", "Data de nascimento", BIRTH_DATE, false),
        field("dataExpedicao", "Data de emissão", ISSUE_DATE, false),
        field("filiacao", "Filiação", PARENTS, false),
    ]
});

static CRECI_GRAMMAR: LazyLock<Vec<FieldDefinition>> = LazyLock::new(|| {
    vec![
        field("nomeCompleto", "Nome completo", NAME, true),
        field(
            "numeroCRECI",
            "Número CRECI",
            r"(?i)CRECI[^\d\n]{0,12}(\d{4,}(?:-?[A-Z])?)",
            true,
        ),
        field("cpf", "CPF", CPF, false),
        field("dataExpedicao", "Data de expedição", ISSUE_DATE, false),
    ]
});
