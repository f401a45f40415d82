pub mod filing;
pub mod fiscal;
pub mod metadata;
pub mod xbrl;

pub use filing::{pad_cik, FilingDescriptor, FilingType};
pub use fiscal::{normalize_period_end_date, FiscalPeriod, FiscalPeriodInfo};
pub use metadata::{estimate_tokens, DataIntegrity, FilingDocument};
pub use xbrl::{
    ArcKind, Balance, Concept, ConceptPeriodType, FactKind, NarrativeSection, Period,
    ProcessedFiling, RelationshipArc, StatementType, ValidationWarning, XbrlContext, XbrlFact,
    XbrlUnit,
};
