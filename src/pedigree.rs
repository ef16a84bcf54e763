use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use log::warn;
use simple_error::{bail, SimpleResult};

use crate::sample::{Kin, Sample};

/// Largest supported proband count
///
/// The joint copy number table is dense over one axis per pedigree member, so
/// its size grows exponentially with the proband count.
pub const MAX_PROBAND_COUNT: usize = 6;

/// Pedigree roles resolved from a pedigree file, probands first and parents
/// last, preserving file order within each role
///
/// A member is a Parent when both its maternal and paternal ids are "0", and
/// a Proband when the affected status flag is set; all other members are
/// skipped with a warning.
///
pub fn read_pedigree_file(filename: &Utf8Path) -> SimpleResult<Vec<(String, Kin)>> {
    let file = match File::open(filename) {
        Ok(file) => file,
        Err(err) => bail!("Unable to open pedigree file '{filename}': {err}"),
    };

    let mut probands = Vec::new();
    let mut parents = Vec::new();

    for (line_index, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => bail!("Unable to read pedigree file '{filename}': {err}"),
        };
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < 6 {
            bail!(
                "Unexpected column count on line {} of pedigree file '{filename}'",
                line_index + 1
            );
        }

        let sample_id = fields[1];
        let maternal_id = fields[2];
        let paternal_id = fields[3];
        let affected = fields[5];

        if sample_id.is_empty() || sample_id == "0" {
            bail!(
                "Missing sample id on line {} of pedigree file '{filename}'",
                line_index + 1
            );
        }

        if maternal_id == "0" && paternal_id == "0" {
            parents.push((sample_id.to_string(), Kin::Parent));
        } else if affected == "affected" {
            probands.push((sample_id.to_string(), Kin::Proband));
        } else {
            warn!("Skipping unaffected non-founder pedigree member '{sample_id}'");
        }
    }

    let mut members = probands;
    members.append(&mut parents);
    Ok(members)
}

/// Fixed pedigree structure over an ordered sample list
///
/// Parent order follows the pedigree file and is preserved across all
/// operations so that axis-based references into the joint copy number
/// distribution stay stable.
///
pub struct Pedigree {
    /// Sample list indices of (parent1, parent2)
    pub parents: [usize; 2],

    /// Sample list indices of the probands, in working list order
    pub probands: Vec<usize>,
}

impl Pedigree {
    pub fn from_samples(samples: &[Sample]) -> SimpleResult<Self> {
        let parents = samples
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.kin == Kin::Parent)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let probands = samples
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.kin == Kin::Proband)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        if parents.len() != 2 {
            bail!(
                "Pedigree calling requires exactly two parents, found {}",
                parents.len()
            );
        }
        if probands.is_empty() {
            bail!("Pedigree calling requires at least one proband");
        }
        if probands.len() > MAX_PROBAND_COUNT {
            bail!(
                "Pedigree calling supports at most {MAX_PROBAND_COUNT} probands, found {}",
                probands.len()
            );
        }

        Ok(Self {
            parents: [parents[0], parents[1]],
            probands,
        })
    }

    /// Sample list indices in joint distribution axis order: parent1,
    /// parent2, then probands
    pub fn axis_samples(&self) -> Vec<usize> {
        let mut axis_samples = vec![self.parents[0], self.parents[1]];
        axis_samples.extend(self.probands.iter().copied());
        axis_samples
    }

    pub fn axis_count(&self) -> usize {
        2 + self.probands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth_model::GaussianDepthModel;

    fn make_sample(name: &str, kin: Kin) -> Sample {
        Sample::new(
            name.to_string(),
            kin,
            30.0,
            3.0,
            Box::new(GaussianDepthModel::new(30.0, 5)),
        )
    }

    #[test]
    fn test_read_pedigree_file() {
        use std::io::Write;

        let dir = std::env::temp_dir().join("kindred_pedigree_test");
        std::fs::create_dir_all(&dir).unwrap();
        let filename = dir.join("trio.ped");
        let mut file = File::create(&filename).unwrap();
        writeln!(file, "fam1\tfather\t0\t0\t1\tunaffected").unwrap();
        writeln!(file, "fam1\tmother\t0\t0\t2\tunaffected").unwrap();
        writeln!(file, "fam1\tchild\tmother\tfather\t1\taffected").unwrap();
        writeln!(file, "fam1\tuncle\tgranny\tgramps\t1\tunaffected").unwrap();
        drop(file);

        let members =
            read_pedigree_file(Utf8Path::from_path(&filename).unwrap()).unwrap();

        // Probands first, parents last, file order within each role
        assert_eq!(
            members,
            vec![
                ("child".to_string(), Kin::Proband),
                ("father".to_string(), Kin::Parent),
                ("mother".to_string(), Kin::Parent),
            ]
        );
    }

    #[test]
    fn test_read_pedigree_file_malformed() {
        use std::io::Write;

        let dir = std::env::temp_dir().join("kindred_pedigree_test");
        std::fs::create_dir_all(&dir).unwrap();
        let filename = dir.join("malformed.ped");
        let mut file = File::create(&filename).unwrap();
        writeln!(file, "fam1\tfather\t0\t0").unwrap();
        drop(file);

        assert!(read_pedigree_file(Utf8Path::from_path(&filename).unwrap()).is_err());
    }

    #[test]
    fn test_pedigree_from_samples() {
        let samples = vec![
            make_sample("child1", Kin::Proband),
            make_sample("child2", Kin::Proband),
            make_sample("father", Kin::Parent),
            make_sample("mother", Kin::Parent),
        ];
        let pedigree = Pedigree::from_samples(&samples).unwrap();

        assert_eq!(pedigree.parents, [2, 3]);
        assert_eq!(pedigree.probands, vec![0, 1]);
        assert_eq!(pedigree.axis_samples(), vec![2, 3, 0, 1]);
        assert_eq!(pedigree.axis_count(), 4);
    }

    #[test]
    fn test_pedigree_requires_two_parents() {
        let samples = vec![
            make_sample("child", Kin::Proband),
            make_sample("mother", Kin::Parent),
        ];
        assert!(Pedigree::from_samples(&samples).is_err());
    }
}
