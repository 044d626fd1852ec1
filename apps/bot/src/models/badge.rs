use serde::{Deserialize, Serialize};

/// The rule-driven badge set. Admins may additionally grant free-form badge
/// names; the ledger stores badges by name, so the two coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    RisingStar,
    MemberAktif,
    WorkerPro,
    FastResponder,
    Veteran,
    TopContributor,
}

impl Badge {
    pub fn name(&self) -> &'static str {
        match self {
            Badge::RisingStar => "Rising Star",
            Badge::MemberAktif => "Member Aktif",
            Badge::WorkerPro => "Worker Pro",
            Badge::FastResponder => "Fast Responder",
            Badge::Veteran => "Veteran",
            Badge::TopContributor => "Top Contributor",
        }
    }
}
