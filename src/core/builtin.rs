//! 内置类别与处置规则
//!
//! 首次启动时写入数据库。每个类别都有一条全国（CPCB）规则，
//! 另有少量邦（SPCB）覆盖规则。

use crate::core::models::{DisposalRule, RuleExtras, WasteCategory};

/// 内置类别
pub fn builtin_categories() -> Vec<WasteCategory> {
    vec![
        WasteCategory::new("medical", "Medical Waste"),
        WasteCategory::new("e-waste", "E-Waste"),
        WasteCategory::new("general", "General Waste"),
        WasteCategory::new("recyclable", "Recyclable Waste"),
        WasteCategory::new("non-recyclable", "Non-Recyclable Waste"),
        WasteCategory::new("hazardous", "Hazardous Waste"),
        WasteCategory::new("organic", "Organic Waste"),
    ]
}

fn extras(
    facilities: &str,
    ppe: &str,
    emergency: &str,
    recyclability: &str,
    environmental: &str,
    cost: &str,
) -> RuleExtras {
    RuleExtras {
        authorized_facilities: Some(facilities.to_string()),
        protective_equipment: Some(ppe.to_string()),
        emergency_procedures: Some(emergency.to_string()),
        recyclability: Some(recyclability.to_string()),
        environmental_risks: Some(environmental.to_string()),
        cost_implications: Some(cost.to_string()),
        state_specific_laws: None,
    }
}

/// 只带邦法规说明的补充信息
fn state_laws(laws: &str) -> RuleExtras {
    RuleExtras {
        state_specific_laws: Some(laws.to_string()),
        ..Default::default()
    }
}

/// 内置处置规则
pub fn builtin_rules() -> Vec<DisposalRule> {
    let mut rules = national_rules();
    rules.extend(state_rules());
    rules
}

fn national_rules() -> Vec<DisposalRule> {
    vec![
        DisposalRule::new(
            "medical",
            None,
            "Segregate into colour-coded bags (yellow for anatomical and soiled waste, red for \
             contaminated plastics, white puncture-proof container for sharps) and hand over to \
             the Common Bio-medical Waste Treatment Facility operator. Do not mix with household \
             waste.",
            "Risk of infection from blood-borne pathogens, needle-stick injuries and exposure to \
             expired pharmaceuticals.",
            "Never recap needles. Seal sharps in a rigid container. Wash hands after handling.",
            "Bio-Medical Waste Management Rules, 2016 (CPCB)",
        )
        .with_extras(extras(
            "Common Bio-medical Waste Treatment Facility (CBWTF) authorised by the SPCB",
            "Disposable gloves, mask",
            "For a needle-stick injury wash with soap and running water and seek post-exposure \
             prophylaxis within 2 hours.",
            "Not recyclable by households; treated plastics are recycled only by authorised \
             CBWTF operators.",
            "Incineration without treatment releases dioxins; untreated waste in landfills spreads \
             pathogens into groundwater.",
            "Free municipal pickup for household quantities; CBWTF operators charge clinics per kg.",
        )),
        DisposalRule::new(
            "e-waste",
            None,
            "Drop at the nearest municipal e-waste collection bin or return through the \
             producer's take-back channel. Do not sell to informal scrap dealers.",
            "Lead, mercury, cadmium and brominated flame retardants leach into soil and water \
             when dumped or burned.",
            "Do not dismantle or burn devices. Tape battery terminals. Keep broken screens intact.",
            "E-Waste (Management) Rules, 2022 (CPCB)",
        )
        .with_extras(extras(
            "CPCB-registered e-waste recyclers and dismantlers; producer take-back points",
            "Gloves when handling broken devices",
            "If a lithium battery swells or smokes, move it outdoors onto sand and keep away from \
             flammables.",
            "High: metals and plastics are recovered by registered recyclers.",
            "Heavy metals contaminate soil and groundwater; open burning releases dioxins and \
             furans.",
            "Free at municipal bins and producer take-back points; some brands pay a buy-back amount.",
        )),
        DisposalRule::new(
            "general",
            None,
            "Place in the mixed/reject waste bin for door-to-door collection by the urban local \
             body. Keep separate from wet and dry recyclable streams.",
            "Open dumping attracts vectors and causes odour; burning releases particulates.",
            "Do not burn waste in the open. Keep bins covered.",
            "Solid Waste Management Rules, 2016 (CPCB)",
        )
        .with_extras(extras(
            "Municipal collection; sanitary landfill operated by the urban local body",
            "None required for household quantities",
            "Report illegal dumping or fires to the municipal helpline.",
            "Low.",
            "Landfill leachate and methane; open burning worsens local air quality.",
            "Covered by the municipal user charge.",
        )),
        DisposalRule::new(
            "recyclable",
            None,
            "Clean and dry the item and place it in the dry waste bin, or hand it to an \
             authorised waste picker or Material Recovery Facility.",
            "Minimal when clean; contaminated recyclables spoil whole batches.",
            "Rinse food containers. Flatten cartons. Remove caps from bottles.",
            "Solid Waste Management Rules, 2016; Plastic Waste Management Rules, 2016 (CPCB)",
        )
        .with_extras(extras(
            "Material Recovery Facilities; registered kabadiwalas; dry waste collection centres",
            "Gloves when handling broken glass or sharp metal",
            "Treat cuts from glass or metal edges with antiseptic.",
            "High for PET, HDPE, paper, cardboard, glass and metals.",
            "Contaminated recyclables end up in landfill; plastics fragment into microplastics.",
            "Free; dry waste may fetch a small price from kabadiwalas.",
        )),
        DisposalRule::new(
            "non-recyclable",
            None,
            "Place in the reject waste stream for co-processing or sanitary landfill. \
             Multi-layered packaging goes back through the brand owner's collection where \
             available.",
            "Persistent in the environment; microplastics and blocked drains.",
            "Do not burn. Avoid single-use plastics banned under the 2022 amendment.",
            "Plastic Waste Management Rules, 2016 (amended 2022) (CPCB)",
        )
        .with_extras(extras(
            "Cement kilns for co-processing; municipal sanitary landfill",
            "None required for household quantities",
            "Report open burning to the SPCB.",
            "Very low; energy recovery through co-processing only.",
            "Persists for centuries; blocks drains and harms livestock and marine life.",
            "Covered by the municipal user charge; spot fines apply for banned plastics.",
        )),
        DisposalRule::new(
            "hazardous",
            None,
            "Store in the original or a sealed, labelled container and hand over at a designated \
             household hazardous waste collection point. Never pour into drains.",
            "Toxic, corrosive, flammable or reactive; can cause burns, poisoning and groundwater \
             contamination.",
            "Keep containers closed and upright. Do not mix chemicals. Store away from children.",
            "Hazardous and Other Wastes (Management and Transboundary Movement) Rules, 2016 (CPCB)",
        )
        .with_extras(extras(
            "Treatment, Storage and Disposal Facilities (TSDF) authorised by the SPCB",
            "Chemical-resistant gloves, eye protection",
            "For skin or eye contact rinse with water for 15 minutes and contact the poison \
             control centre.",
            "Generally not recyclable by households; used oil and lead-acid batteries go to \
             authorised recyclers.",
            "Contaminates groundwater and soil for decades; kills aquatic life when poured into \
             drains.",
            "Free at designated collection drives; TSDF charges apply to bulk generators.",
        )),
        DisposalRule::new(
            "organic",
            None,
            "Place in the wet waste bin for municipal composting or biomethanation, or compost at \
             home.",
            "Methane and leachate when landfilled; attracts pests when left open.",
            "Keep wet waste free of plastic. Drain excess liquid before disposal.",
            "Solid Waste Management Rules, 2016 (CPCB)",
        )
        .with_extras(extras(
            "Municipal composting and biomethanation plants",
            "None required",
            "None.",
            "Fully biodegradable; suitable for compost and biogas.",
            "Methane from landfilled food waste is a potent greenhouse gas.",
            "Free; home composting has no running cost.",
        )),
    ]
}

fn state_rules() -> Vec<DisposalRule> {
    vec![
        DisposalRule::new(
            "e-waste",
            Some("MH"),
            "Submit to an MPCB-authorised e-waste collector or dismantler; bulk consumers must \
             file Form-2 returns.",
            "Lead, mercury, cadmium and brominated flame retardants.",
            "Do not dismantle or burn devices. Tape battery terminals.",
            "Maharashtra Pollution Control Board (MPCB)",
        )
        .with_extras(RuleExtras {
            authorized_facilities: Some("MPCB-authorised dismantlers and recyclers".to_string()),
            protective_equipment: Some("Gloves when handling broken devices".to_string()),
            emergency_procedures: Some(
                "If a battery smokes, move it outdoors onto sand.".to_string(),
            ),
            recyclability: Some("High.".to_string()),
            ..state_laws(
                "Bulk consumers file annual returns with the MPCB under the E-Waste (Management) \
                 Rules, 2022.",
            )
        }),
        DisposalRule::new(
            "e-waste",
            Some("KA"),
            "Hand over at a BBMP dry waste collection centre or a KSPCB-authorised recycler.",
            "Lead, mercury, cadmium and brominated flame retardants.",
            "Do not dismantle or burn devices.",
            "Karnataka State Pollution Control Board (KSPCB)",
        )
        .with_extras(state_laws(
            "BBMP solid waste by-laws require e-waste to be handed over separately from dry waste.",
        )),
        DisposalRule::new(
            "medical",
            Some("DL"),
            "Household biomedical waste (used masks, dressings, syringes) goes in a separate \
             bag marked 'domestic hazardous' for the MCD collector, who hands it to the CBWTF.",
            "Risk of infection and needle-stick injuries.",
            "Seal sharps in a rigid container before bagging.",
            "Delhi Pollution Control Committee (DPCC)",
        )
        .with_extras(state_laws(
            "DPCC directions on domestic biomedical waste; MCD by-laws levy fines for mixing it \
             with household waste.",
        )),
        DisposalRule::new(
            "non-recyclable",
            Some("KL"),
            "Hand over to the Haritha Karma Sena for collection; single-use plastic items are \
             banned in the state.",
            "Persistent in the environment; blocked drains.",
            "Do not burn.",
            "Kerala State Pollution Control Board (KSPCB)",
        )
        .with_extras(state_laws(
            "Kerala government order banning single-use plastic items from 1 January 2020.",
        )),
        DisposalRule::new(
            "organic",
            Some("KL"),
            "Compost at source using bin or pipe composting; the local body collects only where \
             source composting is not possible.",
            "Odour and pests when left open.",
            "Keep wet waste free of plastic.",
            "Kerala State Pollution Control Board (KSPCB); Suchitwa Mission",
        )
        .with_extras(state_laws(
            "Kerala Municipality and Panchayat Raj rules make source-level composting the \
             household's duty.",
        )),
    ]
}
