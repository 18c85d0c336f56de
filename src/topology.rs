//! The static molecular graph: molecule templates with chains, residues,
//! atoms and bonds, plus per-molecule instance counts.
//!
//! The topology is built imperatively: add a molecule, add chains to it,
//! residues to chains, atoms to residues. Each add hands back an index
//! handle used by subsequent adds and by the name/type setters. Atoms may
//! also be added directly to a molecule, outside any chain. Every atom gets
//! a molecule-local index in insertion order; bonds reference atoms by
//! those indices and never cross molecules.
//!
//! The whole graph serializes into the molecules block, which appears
//! exactly once per file, in the header preamble.

use crate::bytes::ByteOrders;
use crate::error::{Error, Result, Warning};
use crate::schema::blocks::BlockId;
use std::io::{Read, Write};

#[derive(Debug, Clone, Default)]
pub struct Topology {
    molecules: Vec<Molecule>,
}

#[derive(Debug, Clone)]
pub struct Molecule {
    id: i64,
    name: String,
    /// Number of instances of this template in the system.
    count: i64,
    chains: Vec<Chain>,
    /// Atoms owned directly by the molecule, outside any chain.
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    next_atom_id: i64,
}

#[derive(Debug, Clone)]
pub struct Chain {
    id: i64,
    name: String,
    residues: Vec<Residue>,
}

#[derive(Debug, Clone)]
pub struct Residue {
    id: i64,
    name: String,
    atoms: Vec<Atom>,
}

#[derive(Debug, Clone)]
pub struct Atom {
    /// Molecule-local index, assigned in insertion order.
    id: i64,
    name: String,
    atom_type: String,
}

/// A bond between two atoms of the same molecule, by molecule-local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub from: i64,
    pub to: i64,
}

/// Handle to a molecule template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoleculeHandle(usize);

/// Handle to a chain within a molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHandle {
    mol: usize,
    chain: usize,
}

/// Handle to a residue within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidueHandle {
    mol: usize,
    chain: usize,
    residue: usize,
}

/// Handle to an atom, wherever it lives in its molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHandle {
    mol: usize,
    loc: AtomLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomLoc {
    Direct(usize),
    InChain {
        chain: usize,
        residue: usize,
        index: usize,
    },
}

impl Topology {
    /// Adds a molecule template with instance count 1.
    pub fn molecule_add(&mut self, name: &str) -> MoleculeHandle {
        let id = self.molecules.len() as i64;
        self.molecules.push(Molecule {
            id,
            name: name.to_owned(),
            count: 1,
            chains: Vec::new(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            next_atom_id: 0,
        });
        MoleculeHandle(self.molecules.len() - 1)
    }

    pub fn chain_add(&mut self, mol: MoleculeHandle, name: &str) -> ChainHandle {
        let molecule = &mut self.molecules[mol.0];
        let id = molecule.chains.len() as i64;
        molecule.chains.push(Chain {
            id,
            name: name.to_owned(),
            residues: Vec::new(),
        });
        ChainHandle {
            mol: mol.0,
            chain: molecule.chains.len() - 1,
        }
    }

    pub fn residue_add(&mut self, chain: ChainHandle, name: &str) -> ResidueHandle {
        let owner = &mut self.molecules[chain.mol].chains[chain.chain];
        let id = owner.residues.len() as i64;
        owner.residues.push(Residue {
            id,
            name: name.to_owned(),
            atoms: Vec::new(),
        });
        ResidueHandle {
            mol: chain.mol,
            chain: chain.chain,
            residue: owner.residues.len() - 1,
        }
    }

    pub fn atom_add(&mut self, residue: ResidueHandle, name: &str, atom_type: &str) -> AtomHandle {
        let molecule = &mut self.molecules[residue.mol];
        let id = molecule.next_atom_id;
        molecule.next_atom_id += 1;
        let owner = &mut molecule.chains[residue.chain].residues[residue.residue];
        owner.atoms.push(Atom {
            id,
            name: name.to_owned(),
            atom_type: atom_type.to_owned(),
        });
        AtomHandle {
            mol: residue.mol,
            loc: AtomLoc::InChain {
                chain: residue.chain,
                residue: residue.residue,
                index: owner.atoms.len() - 1,
            },
        }
    }

    /// Adds an atom owned directly by the molecule, outside any chain.
    pub fn molecule_atom_add(
        &mut self,
        mol: MoleculeHandle,
        name: &str,
        atom_type: &str,
    ) -> AtomHandle {
        let molecule = &mut self.molecules[mol.0];
        let id = molecule.next_atom_id;
        molecule.next_atom_id += 1;
        molecule.atoms.push(Atom {
            id,
            name: name.to_owned(),
            atom_type: atom_type.to_owned(),
        });
        AtomHandle {
            mol: mol.0,
            loc: AtomLoc::Direct(molecule.atoms.len() - 1),
        }
    }

    /// Adds a bond between two molecule-local atom indices.
    pub fn bond_add(&mut self, mol: MoleculeHandle, from: i64, to: i64) -> Result<()> {
        let molecule = &mut self.molecules[mol.0];
        let n = molecule.atom_count();
        for atom in [from, to] {
            if atom < 0 || atom >= n {
                return Err(Error::BadBondIndex {
                    molecule: molecule.id,
                    atom,
                });
            }
        }
        molecule.bonds.push(Bond { from, to });
        Ok(())
    }

    pub fn molecule_name_set(&mut self, mol: MoleculeHandle, name: &str) {
        self.molecules[mol.0].name = name.to_owned();
    }

    pub fn chain_name_set(&mut self, chain: ChainHandle, name: &str) {
        self.molecules[chain.mol].chains[chain.chain].name = name.to_owned();
    }

    pub fn residue_name_set(&mut self, residue: ResidueHandle, name: &str) {
        self.molecules[residue.mol].chains[residue.chain].residues[residue.residue].name =
            name.to_owned();
    }

    pub fn atom_name_set(&mut self, atom: AtomHandle, name: &str) {
        self.atom_mut(atom).name = name.to_owned();
    }

    pub fn atom_type_set(&mut self, atom: AtomHandle, atom_type: &str) {
        self.atom_mut(atom).atom_type = atom_type.to_owned();
    }

    #[must_use]
    pub fn molecule_count(&self, mol: MoleculeHandle) -> i64 {
        self.molecules[mol.0].count
    }

    pub fn molecule_count_set(&mut self, mol: MoleculeHandle, count: i64) -> Result<()> {
        if count < 0 {
            return Err(Error::InvalidArgument("negative molecule instance count"));
        }
        self.molecules[mol.0].count = count;
        Ok(())
    }

    fn atom_mut(&mut self, atom: AtomHandle) -> &mut Atom {
        let molecule = &mut self.molecules[atom.mol];
        match atom.loc {
            AtomLoc::Direct(index) => &mut molecule.atoms[index],
            AtomLoc::InChain {
                chain,
                residue,
                index,
            } => &mut molecule.chains[chain].residues[residue].atoms[index],
        }
    }

    #[must_use]
    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    /// Total particle count: Σ instances × atoms per molecule.
    #[must_use]
    pub fn num_particles(&self) -> i64 {
        self.molecules
            .iter()
            .map(|m| m.count * m.atom_count())
            .sum()
    }

    /// Total molecule instances across all templates.
    #[must_use]
    pub fn num_molecules(&self) -> i64 {
        self.molecules.iter().map(|m| m.count).sum()
    }

    /// Serializes the molecules-block content.
    pub fn write_contents<W: Write>(&self, w: &mut W, orders: ByteOrders) -> Result<()> {
        orders.write_i64(w, self.molecules.len() as i64)?;
        for molecule in &self.molecules {
            orders.write_i64(w, molecule.id)?;
            orders.write_string(w, &molecule.name)?;
            orders.write_i64(w, molecule.count)?;
            orders.write_i64(w, molecule.chains.len() as i64)?;
            for chain in &molecule.chains {
                orders.write_i64(w, chain.id)?;
                orders.write_string(w, &chain.name)?;
                orders.write_i64(w, chain.residues.len() as i64)?;
                for residue in &chain.residues {
                    orders.write_i64(w, residue.id)?;
                    orders.write_string(w, &residue.name)?;
                    orders.write_i64(w, residue.atoms.len() as i64)?;
                    for atom in &residue.atoms {
                        write_atom(w, orders, atom)?;
                    }
                }
            }
            orders.write_i64(w, molecule.atoms.len() as i64)?;
            for atom in &molecule.atoms {
                write_atom(w, orders, atom)?;
            }
            orders.write_i64(w, molecule.bonds.len() as i64)?;
            for bond in &molecule.bonds {
                orders.write_i64(w, bond.from)?;
                orders.write_i64(w, bond.to)?;
            }
        }
        Ok(())
    }

    /// Parses the molecules-block content.
    pub fn read_contents<R: Read>(
        r: &mut R,
        orders: ByteOrders,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let n_molecules = read_count(r, orders)?;
        let mut molecules = Vec::new();
        for _ in 0..n_molecules {
            let id = orders.read_i64(r)?;
            let name = orders.read_string(r, warnings)?;
            let count = orders.read_i64(r)?;
            if count < 0 {
                return Err(Error::InvalidCount {
                    id: BlockId::MOLECULES,
                    count,
                });
            }
            let mut n_atoms = 0i64;
            let n_chains = read_count(r, orders)?;
            let mut chains = Vec::new();
            for _ in 0..n_chains {
                let id = orders.read_i64(r)?;
                let name = orders.read_string(r, warnings)?;
                let n_residues = read_count(r, orders)?;
                let mut residues = Vec::new();
                for _ in 0..n_residues {
                    let id = orders.read_i64(r)?;
                    let name = orders.read_string(r, warnings)?;
                    let n_res_atoms = read_count(r, orders)?;
                    let mut atoms = Vec::new();
                    for _ in 0..n_res_atoms {
                        atoms.push(read_atom(r, orders, warnings)?);
                    }
                    n_atoms += n_res_atoms;
                    residues.push(Residue { id, name, atoms });
                }
                chains.push(Chain { id, name, residues });
            }
            let n_direct = read_count(r, orders)?;
            let mut atoms = Vec::new();
            for _ in 0..n_direct {
                atoms.push(read_atom(r, orders, warnings)?);
            }
            n_atoms += n_direct;
            let n_bonds = read_count(r, orders)?;
            let mut bonds = Vec::new();
            for _ in 0..n_bonds {
                let from = orders.read_i64(r)?;
                let to = orders.read_i64(r)?;
                for atom in [from, to] {
                    if atom < 0 || atom >= n_atoms {
                        return Err(Error::BadBondIndex { molecule: id, atom });
                    }
                }
                bonds.push(Bond { from, to });
            }
            molecules.push(Molecule {
                id,
                name,
                count,
                chains,
                atoms,
                bonds,
                next_atom_id: n_atoms,
            });
        }
        Ok(Self { molecules })
    }
}

impl Molecule {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.count
    }

    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Atoms owned directly by the molecule, outside any chain.
    #[must_use]
    pub fn direct_atoms(&self) -> &[Atom] {
        &self.atoms
    }

    #[must_use]
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Atoms per instance, chains and direct atoms combined.
    #[must_use]
    pub fn atom_count(&self) -> i64 {
        let in_chains: usize = self
            .chains
            .iter()
            .flat_map(|c| &c.residues)
            .map(|r| r.atoms.len())
            .sum();
        (in_chains + self.atoms.len()) as i64
    }
}

impl Chain {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }
}

impl Residue {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }
}

impl Atom {
    /// Molecule-local index.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn atom_type(&self) -> &str {
        &self.atom_type
    }
}

fn write_atom<W: Write>(w: &mut W, orders: ByteOrders, atom: &Atom) -> Result<()> {
    orders.write_i64(w, atom.id)?;
    orders.write_string(w, &atom.name)?;
    orders.write_string(w, &atom.atom_type)?;
    Ok(())
}

fn read_atom<R: Read>(r: &mut R, orders: ByteOrders, warnings: &mut Vec<Warning>) -> Result<Atom> {
    let id = orders.read_i64(r)?;
    let name = orders.read_string(r, warnings)?;
    let atom_type = orders.read_string(r, warnings)?;
    Ok(Atom {
        id,
        name,
        atom_type,
    })
}

fn read_count<R: Read>(r: &mut R, orders: ByteOrders) -> Result<i64> {
    let count = orders.read_i64(r)?;
    if count < 0 {
        return Err(Error::InvalidCount {
            id: BlockId::MOLECULES,
            count,
        });
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(topology: &mut Topology) -> MoleculeHandle {
        let mol = topology.molecule_add("water");
        let chain = topology.chain_add(mol, "W");
        let residue = topology.residue_add(chain, "HOH");
        topology.atom_add(residue, "O", "O");
        topology.atom_add(residue, "H1", "H");
        topology.atom_add(residue, "H2", "H");
        mol
    }

    #[test]
    fn particle_count() {
        let mut topology = Topology::default();
        let mol = water(&mut topology);
        topology.molecule_count_set(mol, 1000).unwrap();
        assert_eq!(3000, topology.num_particles());
        assert_eq!(1000, topology.num_molecules());

        // A second template contributes instances x atoms.
        let ion = topology.molecule_add("Na+");
        topology.molecule_atom_add(ion, "NA", "Na");
        topology.molecule_count_set(ion, 50).unwrap();
        assert_eq!(3050, topology.num_particles());
        assert_eq!(1050, topology.num_molecules());
    }

    #[test]
    fn bonds_validated() {
        let mut topology = Topology::default();
        let mol = water(&mut topology);
        topology.bond_add(mol, 0, 1).unwrap();
        topology.bond_add(mol, 0, 2).unwrap();
        assert!(matches!(
            topology.bond_add(mol, 0, 3),
            Err(Error::BadBondIndex { atom: 3, .. })
        ));
        assert!(topology.bond_add(mol, -1, 0).is_err());
    }

    #[test]
    fn serialization_round_trip() {
        let orders = ByteOrders::native();
        let mut topology = Topology::default();
        let mol = water(&mut topology);
        topology.molecule_count_set(mol, 12).unwrap();
        topology.bond_add(mol, 0, 1).unwrap();
        topology.bond_add(mol, 0, 2).unwrap();
        let ion = topology.molecule_add("Cl-");
        topology.molecule_atom_add(ion, "CL", "Cl");

        let mut contents = Vec::new();
        topology.write_contents(&mut contents, orders).unwrap();
        let mut warnings = Vec::new();
        let read =
            Topology::read_contents(&mut contents.as_slice(), orders, &mut warnings).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(topology.num_particles(), read.num_particles());
        assert_eq!(2, read.molecules().len());

        let molecule = &read.molecules()[0];
        assert_eq!("water", molecule.name());
        assert_eq!(12, molecule.count());
        assert_eq!(vec![Bond { from: 0, to: 1 }, Bond { from: 0, to: 2 }], molecule.bonds);
        let residue = &molecule.chains()[0].residues()[0];
        assert_eq!("HOH", residue.name());
        assert_eq!("O", residue.atoms()[0].name());
        assert_eq!("H", residue.atoms()[2].atom_type());
        assert_eq!(2, residue.atoms()[2].id());

        assert_eq!("CL", read.molecules()[1].direct_atoms()[0].name());
    }
}
