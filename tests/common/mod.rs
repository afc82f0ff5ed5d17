//! Shared two-sector model inputs.
//!
//! Make = [[90, 10], [0, 200]], Use = [[10, 40], [20, 60]], one value added row
//! [70, 100] and household/export final demand [[40, 0], [100, 30]], so that
//! industry output is [100, 200] and commodity output is [90, 210].

#![allow(dead_code)]

use useeio::model::ModelInputs;
use useeio_core::indicators::IndicatorFactor;
use useeio_core::matrix::LabeledMatrix;
use useeio_core::satellite::{FlowTotal, SatelliteTable};
use useeio_core::sectors::{Sector, SectorKind, SectorTable};
use useeio_core::specs::{IndicatorSpec, ModelSpecs};
use useeio_core::tables::{FinalDemandGroup, FinalDemandSector, IOTables};

pub const SECTORS: [&str; 2] = ["1/US", "2/US"];

fn catalog(kind: SectorKind) -> SectorTable {
    SectorTable::new(
        kind,
        vec![
            Sector::new("1", "US", "Agriculture", "Primary"),
            Sector::new("2", "US", "Manufacturing", "Secondary"),
        ],
    )
    .unwrap()
}

pub fn tables() -> IOTables {
    IOTables::new(
        catalog(SectorKind::Commodity),
        catalog(SectorKind::Industry),
        vec![
            FinalDemandSector::new("F010/US", "Household", FinalDemandGroup::Household),
            FinalDemandSector::new("F040/US", "Exports", FinalDemandGroup::Export),
        ],
        LabeledMatrix::from_rows(
            "MakeTransactions",
            &SECTORS,
            &SECTORS,
            vec![vec![90.0, 10.0], vec![0.0, 200.0]],
        )
        .unwrap(),
        LabeledMatrix::from_rows(
            "UseTransactions",
            &SECTORS,
            &SECTORS,
            vec![vec![10.0, 40.0], vec![20.0, 60.0]],
        )
        .unwrap(),
        LabeledMatrix::from_rows("UseValueAdded", &["V001/US"], &SECTORS, vec![vec![70.0, 100.0]])
            .unwrap(),
        LabeledMatrix::from_rows(
            "FinalDemand",
            &SECTORS,
            &["F010/US", "F040/US"],
            vec![vec![40.0, 0.0], vec![100.0, 30.0]],
        )
        .unwrap(),
        2012,
    )
    .unwrap()
}

pub fn inputs() -> ModelInputs {
    ModelInputs {
        tables: tables(),
        satellites: vec![SatelliteTable::new(
            "GHG",
            vec![
                FlowTotal::new("CO2", "emission/air", "kg", "1/US", 50.0, 2012),
                FlowTotal::new("CO2", "emission/air", "kg", "2/US", 100.0, 2012),
                FlowTotal::new("CH4", "emission/air", "kg", "2/US", 4.0, 2012),
            ],
        )],
        indicator_factors: vec![
            IndicatorFactor::new("Greenhouse Gases", "CO2", "emission/air", "kg", 1.0),
            IndicatorFactor::new("Greenhouse Gases", "CH4", "emission/air", "kg", 28.0),
        ],
    }
}

pub fn specs() -> ModelSpecs {
    ModelSpecs {
        model: "TwoSector".to_string(),
        indicators: vec![IndicatorSpec {
            name: "Greenhouse Gases".into(),
            code: "GHG".into(),
            unit: "kg CO2 eq".into(),
            ..IndicatorSpec::default()
        }],
        ..ModelSpecs::default()
    }
}

pub fn labels(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|s| s.to_string()).collect()
}
