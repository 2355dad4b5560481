// src/sources/keywords.rs
//! Keyword and marker tables. Plain data: phrases are written in their
//! natural form and folded/lowercased at match time.

use crate::ingest::types::SupportCategory;

/// Core PT/EN topic keywords shared by every national source.
pub const CORE_KEYWORDS: &[&str] = &[
    "apoio",
    "apoios",
    "candidatura",
    "candidaturas",
    "aviso",
    "avisos",
    "edificio",
    "edifícios",
    "habitacao",
    "habitação",
    "reabilitacao",
    "eficiencia energetica",
    "support",
    "grant",
    "funding",
    "application",
    "building",
    "buildings",
    "housing",
    "rehabilitation",
    "energy efficiency",
];

/// Extra energy terms appended to the energy keyword set.
pub const ENERGY_EXTRA_KEYWORDS: &[&str] = &[
    "isolamento",
    "janelas",
    "vale eficiencia",
    "renewable energy",
    "energia renovável",
];

/// Terms that make a page relevant to energy efficiency on their own.
pub const GENERIC_RELEVANCE_TERMS: &[&str] = &[
    "eficiência energética",
    "energy efficiency",
    "energy saving",
    "energia renovável",
    "renewable energy",
    "reabilitação energética",
    "energy retrofit",
    "descarbonização",
    "decarbonization",
    "carbon neutral",
];

/// Per-category keyword phrases, in declaration order.
pub const CATEGORY_KEYWORDS: &[(SupportCategory, &[&str])] = &[
    (
        SupportCategory::Janelas,
        &[
            "janelas eficientes",
            "janela",
            "caixilharia",
            "vidro duplo",
            "vidro triplo",
            "envidraçado",
            "vãos envidraçados",
            "caixilhos",
            "efficient windows",
            "window",
            "glazing",
            "double glazing",
            "triple glazing",
            "window frames",
            "fenestration",
        ],
    ),
    (
        SupportCategory::BombasCalor,
        &[
            "bomba de calor",
            "bombas de calor",
            "aquecimento aerotérmico",
            "geotérmico",
            "climatização eficiente",
            "aerotermia",
            "heat pump",
            "heat pumps",
            "aerothermal",
            "geothermal",
            "air source heat pump",
            "ground source heat pump",
        ],
    ),
    (
        SupportCategory::Isolamento,
        &[
            "isolamento térmico",
            "capoto",
            "etics",
            "isolamento paredes",
            "isolamento fachadas",
            "revestimento térmico",
            "isolamento exterior",
            "thermal insulation",
            "wall insulation",
            "facade insulation",
            "external insulation",
            "cavity wall",
            "insulation material",
        ],
    ),
    (
        SupportCategory::Solar,
        &[
            "solar fotovoltaico",
            "painéis solares",
            "fotovoltaico",
            "autoconsumo",
            "energia solar",
            "painel solar",
            "módulos fotovoltaicos",
            "solar photovoltaic",
            "solar panels",
            "photovoltaic",
            "pv panels",
            "self-consumption",
            "solar energy",
            "solar power",
        ],
    ),
    (
        SupportCategory::AquecimentoAguas,
        &[
            "aquecimento de águas",
            "águas quentes sanitárias",
            "aqs",
            "solar térmico",
            "termoacumulador",
            "esquentador",
            "water heating",
            "domestic hot water",
            "dhw",
            "solar thermal",
            "water heater",
            "hot water system",
        ],
    ),
    (
        SupportCategory::Cobertura,
        &[
            "cobertura",
            "telhado",
            "isolamento cobertura",
            "telhas",
            "impermeabilização",
            "isolamento telhado",
            "sótão",
            "roof",
            "roofing",
            "roof insulation",
            "attic insulation",
            "loft insulation",
            "waterproofing",
        ],
    ),
];

/// Application-intent keywords: a candidate needs one of these when its
/// source requires intent.
pub const APPLICATION_INTENT_KEYWORDS: &[&str] = &[
    "candidatura",
    "candidaturas",
    "candidatar",
    "aviso",
    "avisos",
    "concurso",
    "concursos",
    "beneficiario",
    "beneficiarios",
    "submissao",
    "submissões",
    "submeter",
    "inscricao",
    "inscrição",
    "regulamento",
    "formulario",
    "formulário",
    "application",
    "apply",
    "submission",
    "submit",
    "registration",
    "register",
    "funding",
    "grant",
    "eligibility",
];

/// Navigation/boilerplate markers. A link whose text contains one of these
/// phrases is never a program.
pub const BLOCKED_DISCOVERY_MARKERS: &[&str] = &[
    "skip to content",
    "saltar para o conteudo principal",
    "politica de privacidade",
    "aviso de privacidade",
    "cookies",
    "mapa do site",
    "termos e condicoes",
    "contactos",
    "contacte-nos",
    "canal de denuncias",
    "rss",
    "login",
    "registar",
    "área reservada",
    "ver detalhes",
    "ver se sou elegivel",
    "guardar",
    "privacy policy",
    "cookie policy",
    "terms and conditions",
    "contact us",
    "sitemap",
    "sign in",
    "sign up",
    "register",
    "view details",
    "save",
];

/// Sub-paths probed on every municipal website.
pub const MUNICIPAL_DISCOVERY_PATHS: &[&str] = &[
    "/habitacao",
    "/reabilitacao-urbana",
    "/acao-social",
    "/ambiente",
    "/energia",
    "/urbanismo",
    "/regulamentos",
    "/avisos",
    "/editais",
    "/candidaturas",
];

/// Core keywords as owned strings.
pub fn core_keywords() -> Vec<String> {
    CORE_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

/// Core keywords plus every category phrase plus the energy extras,
/// deduplicated by matching form, first occurrence kept.
pub fn energy_keywords() -> Vec<String> {
    let all = CORE_KEYWORDS
        .iter()
        .chain(CATEGORY_KEYWORDS.iter().flat_map(|(_, kws)| kws.iter()))
        .chain(ENERGY_EXTRA_KEYWORDS.iter());
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for kw in all {
        if seen.insert(crate::text::normalize_text(kw)) {
            out.push(kw.to_string());
        }
    }
    out
}
