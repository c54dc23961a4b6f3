use super::super::domain::Program;

/// Population below which no site is required for any program.
pub const MINIMUM_SERVED_POPULATION: u64 = 1_000;
/// Upper bound of the proportional band; larger communities use the metro formula.
pub const METRO_THRESHOLD: u64 = 500_000;

/// Default number of collection sites a community must host for a program.
pub fn required_sites(population: u64, program: Program) -> u32 {
    let required = match program {
        Program::Paint => banded(population, 5_000, 40_000, 13, 150_000, true),
        Program::Solvents | Program::Pesticides => {
            banded(population, 10_000, 250_000, 2, 300_000, true)
        }
        Program::Lighting => banded(population, 1_000, 15_000, 34, 50_000, false),
    };

    u32::try_from(required).unwrap_or(u32::MAX)
}

/// Same as [`required_sites`] but keyed by a raw program tag; unknown tags need 0 sites.
pub fn required_sites_for_tag(population: u64, tag: &str) -> u32 {
    Program::parse(tag)
        .map(|program| required_sites(population, program))
        .unwrap_or(0)
}

fn banded(
    population: u64,
    lower_bound: u64,
    divisor: u64,
    metro_base: u64,
    metro_divisor: u64,
    small_community_floor: bool,
) -> u64 {
    if population > METRO_THRESHOLD {
        metro_base + ceil_div(population - METRO_THRESHOLD, metro_divisor)
    } else if population >= lower_bound {
        ceil_div(population, divisor)
    } else if small_community_floor && population >= MINIMUM_SERVED_POPULATION {
        1
    } else {
        0
    }
}

pub(crate) fn ceil_div(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    numerator.div_ceil(denominator)
}
