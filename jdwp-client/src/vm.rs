// VirtualMachine command implementations
//
// These are the fundamental commands for interacting with the JVM

use crate::commands::{command_sets, vm_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_string, read_u64, read_u8};
use crate::types::{ReferenceTypeId, StringId, ThreadId};
use crate::writer::put_string;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use tracing::info;

/// JVM version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

/// ID sizes used by the JVM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmIdSizes {
    pub field_id_size: i32,
    pub method_id_size: i32,
    pub object_id_size: i32,
    pub reference_type_id_size: i32,
    pub frame_id_size: i32,
}

/// Class information from ClassesBySignature / AllClasses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub ref_type_tag: u8, // 1=class, 2=interface, 3=array
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub status: i32,
}

impl JdwpConnection {
    /// VirtualMachine.Version
    pub async fn get_version(&self) -> JdwpResult<VmVersion> {
        let reply = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::VERSION, Vec::new())
            .await?;

        let mut data = reply.data();

        Ok(VmVersion {
            description: read_string(&mut data)?,
            jdwp_major: read_i32(&mut data)?,
            jdwp_minor: read_i32(&mut data)?,
            vm_version: read_string(&mut data)?,
            vm_name: read_string(&mut data)?,
        })
    }

    /// VirtualMachine.IDSizes
    pub async fn get_id_sizes(&self) -> JdwpResult<VmIdSizes> {
        let reply = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES, Vec::new())
            .await?;

        let mut data = reply.data();

        Ok(VmIdSizes {
            field_id_size: read_i32(&mut data)?,
            method_id_size: read_i32(&mut data)?,
            object_id_size: read_i32(&mut data)?,
            reference_type_id_size: read_i32(&mut data)?,
            frame_id_size: read_i32(&mut data)?,
        })
    }

    /// Find classes by signature (VirtualMachine.ClassesBySignature)
    /// Signature format: "Lcom/example/MyClass;" for classes
    pub async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        let mut payload = Vec::new();
        put_string(&mut payload, signature);

        let reply = self
            .request(
                command_sets::VIRTUAL_MACHINE,
                vm_commands::CLASSES_BY_SIGNATURE,
                payload,
            )
            .await?;

        let mut data = reply.data();

        let classes_count = read_i32(&mut data)?;
        let mut classes = Vec::with_capacity(classes_count.max(0) as usize);

        for _ in 0..classes_count {
            let ref_type_tag = read_u8(&mut data)?;
            let type_id = read_u64(&mut data)?;
            let status = read_i32(&mut data)?;

            classes.push(ClassInfo {
                ref_type_tag,
                type_id,
                signature: signature.to_string(),
                status,
            });
        }

        Ok(classes)
    }

    /// Every loaded reference type (VirtualMachine.AllClasses)
    pub async fn all_classes(&self) -> JdwpResult<Vec<ClassInfo>> {
        let reply = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::ALL_CLASSES, Vec::new())
            .await?;

        let mut data = reply.data();

        let classes_count = read_i32(&mut data)?;
        let mut classes = Vec::with_capacity(classes_count.max(0) as usize);

        for _ in 0..classes_count {
            classes.push(ClassInfo {
                ref_type_tag: read_u8(&mut data)?,
                type_id: read_u64(&mut data)?,
                signature: read_string(&mut data)?,
                status: read_i32(&mut data)?,
            });
        }

        Ok(classes)
    }

    /// VirtualMachine.AllThreads
    pub async fn get_all_threads(&self) -> JdwpResult<Vec<ThreadId>> {
        let reply = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::ALL_THREADS, Vec::new())
            .await?;

        let mut data = reply.data();

        let threads_count = read_i32(&mut data)?;
        let mut threads = Vec::with_capacity(threads_count.max(0) as usize);

        for _ in 0..threads_count {
            threads.push(read_u64(&mut data)?);
        }

        Ok(threads)
    }

    /// Suspend all threads (VirtualMachine.Suspend)
    pub async fn suspend_all(&self) -> JdwpResult<()> {
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::SUSPEND, Vec::new())
            .await?;
        Ok(())
    }

    /// Resume all threads (VirtualMachine.Resume). Decrements each suspend count by one.
    pub async fn resume_all(&self) -> JdwpResult<()> {
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::RESUME, Vec::new())
            .await?;
        Ok(())
    }

    /// Create a String in the target (VirtualMachine.CreateString)
    pub async fn create_string(&self, value: &str) -> JdwpResult<StringId> {
        let mut payload = Vec::new();
        put_string(&mut payload, value);

        let reply = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::CREATE_STRING, payload)
            .await?;

        let mut data = reply.data();
        read_u64(&mut data)
    }

    /// Detach from the target; the VM keeps running (VirtualMachine.Dispose)
    pub async fn dispose(&self) -> JdwpResult<()> {
        info!("Disposing JDWP connection");
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::DISPOSE, Vec::new())
            .await?;
        Ok(())
    }

    /// Terminate the target VM (VirtualMachine.Exit)
    pub async fn exit(&self, exit_code: i32) -> JdwpResult<()> {
        let mut payload = Vec::new();
        payload.put_i32(exit_code);

        info!("Requesting VM exit with code {}", exit_code);
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::EXIT, payload)
            .await?;
        Ok(())
    }
}
